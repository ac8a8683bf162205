use protobuf_codegen::Customize;

fn main() {
    // Generate the onnx protobuf files
    // Bytes fields (raw tensor payloads, string attributes) are generated as bytes::Bytes
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["src"])
        .input("src/protos/onnx.proto")
        .cargo_out_dir("onnx-protos")
        .customize(Customize::default().tokio_bytes(true))
        .run_from_script();
}
