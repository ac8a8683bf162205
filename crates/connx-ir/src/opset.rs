//! Resolution of operator set declarations into per-operator availability.
//!
//! Every default-domain operator is listed with the operator set versions at which its
//! definition changed. Resolving a declared version picks, for each operator, the newest
//! definition not newer than that version.

use std::collections::HashMap;

use crate::ir::{OpsetDeclaration, is_default_domain};

/// Newest default-domain operator set version known to the resolver.
pub const LATEST_OPSET_VERSION: i64 = 21;

/// Availability of one operator at a resolved operator set version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSupport {
    /// The runtime implements the definition introduced at `since_version`.
    Implemented {
        /// Operator set version that introduced the resolved definition.
        since_version: i64,
    },
    /// The operator exists at this version but the runtime has no implementation.
    NotImplemented,
}

/// Mapping from operator type name to its availability.
///
/// Operators absent from the table are unknown at the resolved version. Absent and
/// [`OperatorSupport::NotImplemented`] both mean the operator cannot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorSupportTable {
    entries: HashMap<String, OperatorSupport>,
}

impl OperatorSupportTable {
    /// Record the availability of an operator.
    pub fn insert(&mut self, op_type: impl Into<String>, support: OperatorSupport) {
        self.entries.insert(op_type.into(), support);
    }

    /// The entry of an operator, `None` if it is unknown.
    pub fn get(&self, op_type: &str) -> Option<OperatorSupport> {
        self.entries.get(op_type).copied()
    }

    /// Whether the operator can be executed.
    pub fn is_available(&self, op_type: &str) -> bool {
        matches!(
            self.get(op_type),
            Some(OperatorSupport::Implemented { .. })
        )
    }

    /// Number of known operators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no operator is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, OperatorSupport)> {
        self.entries.iter().map(|(name, support)| (name.as_str(), *support))
    }
}

/// Turns operator set declarations into an [`OperatorSupportTable`].
pub trait OpsetResolver {
    /// Resolve the declarations into the support table and the resolved default-domain version.
    ///
    /// Must be deterministic for a given input.
    fn resolve(&self, declarations: &[OpsetDeclaration]) -> (OperatorSupportTable, i64);
}

/// The operator table of the connx runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnxOpsetResolver;

impl ConnxOpsetResolver {
    /// Default-domain version selected by a set of declarations.
    ///
    /// No declaration at all means version 1. Declarations that only name other domains
    /// select version 0, at which no default-domain operator exists.
    pub fn resolved_version(declarations: &[OpsetDeclaration]) -> i64 {
        if declarations.is_empty() {
            return 1;
        }

        declarations
            .iter()
            .filter(|decl| is_default_domain(&decl.domain))
            .map(|decl| decl.version)
            .max()
            .unwrap_or(0)
    }
}

impl OpsetResolver for ConnxOpsetResolver {
    fn resolve(&self, declarations: &[OpsetDeclaration]) -> (OperatorSupportTable, i64) {
        for decl in declarations.iter().filter(|d| !is_default_domain(&d.domain)) {
            log::debug!("No operators registered for {decl}, ignoring");
        }

        let version = Self::resolved_version(declarations);
        if version > LATEST_OPSET_VERSION {
            log::warn!(
                "Operator set version {version} is newer than {LATEST_OPSET_VERSION}, using the newest known definitions"
            );
        }

        let mut table = OperatorSupportTable::default();
        for entry in OPERATORS {
            let Some(&since_version) = entry.since.iter().rev().find(|&&v| v <= version) else {
                continue;
            };
            let support = if entry.implemented {
                OperatorSupport::Implemented { since_version }
            } else {
                OperatorSupport::NotImplemented
            };
            table.insert(entry.name, support);
        }

        log::debug!(
            "Resolved default operator set version {version} with {} operators",
            table.len()
        );
        (table, version)
    }
}

struct OperatorEntry {
    name: &'static str,
    since: &'static [i64],
    implemented: bool,
}

const fn op(name: &'static str, since: &'static [i64]) -> OperatorEntry {
    OperatorEntry {
        name,
        since,
        implemented: true,
    }
}

const fn missing(name: &'static str, since: &'static [i64]) -> OperatorEntry {
    OperatorEntry {
        name,
        since,
        implemented: false,
    }
}

#[rustfmt::skip]
static OPERATORS: &[OperatorEntry] = &[
    op("Abs", &[1, 6, 13]),
    op("Acos", &[7]),
    op("Acosh", &[9]),
    op("Add", &[1, 6, 7, 13, 14]),
    missing("AffineGrid", &[20]),
    op("And", &[1, 7]),
    op("ArgMax", &[1, 11, 12, 13]),
    op("ArgMin", &[1, 11, 12, 13]),
    op("Asin", &[7]),
    op("Asinh", &[9]),
    op("Atan", &[7]),
    op("Atanh", &[9]),
    op("AveragePool", &[1, 7, 10, 11, 19]),
    op("BatchNormalization", &[1, 6, 7, 9, 14, 15]),
    missing("Bernoulli", &[15]),
    op("BitShift", &[11]),
    op("BitwiseAnd", &[18]),
    op("BitwiseNot", &[18]),
    op("BitwiseOr", &[18]),
    op("BitwiseXor", &[18]),
    missing("BlackmanWindow", &[17]),
    op("Cast", &[1, 6, 9, 13, 19, 21]),
    op("CastLike", &[15, 19, 21]),
    op("Ceil", &[1, 6, 13]),
    op("Celu", &[12]),
    missing("CenterCropPad", &[18]),
    op("Clip", &[1, 6, 11, 12, 13]),
    missing("Col2Im", &[18]),
    op("Compress", &[9, 11]),
    op("Concat", &[1, 4, 11, 13]),
    missing("ConcatFromSequence", &[11]),
    op("Constant", &[1, 9, 11, 12, 13, 19, 21]),
    op("ConstantOfShape", &[9, 20, 21]),
    op("Conv", &[1, 11]),
    missing("ConvInteger", &[10]),
    op("ConvTranspose", &[1, 11]),
    op("Cos", &[7]),
    op("Cosh", &[9]),
    op("CumSum", &[11, 14]),
    missing("DFT", &[17, 20]),
    missing("DeformConv", &[19]),
    op("DepthToSpace", &[1, 11, 13]),
    missing("DequantizeLinear", &[10, 13, 19, 21]),
    missing("Det", &[11]),
    op("Div", &[1, 6, 7, 13, 14]),
    op("Dropout", &[1, 6, 7, 10, 12, 13]),
    missing("DynamicQuantizeLinear", &[11]),
    missing("Einsum", &[12]),
    op("Elu", &[1, 6]),
    op("Equal", &[1, 7, 11, 13, 19]),
    op("Erf", &[9, 13]),
    op("Exp", &[1, 6, 13]),
    op("Expand", &[8, 13]),
    op("EyeLike", &[9]),
    op("Flatten", &[1, 9, 11, 13, 21]),
    op("Floor", &[1, 6, 13]),
    missing("GRU", &[1, 3, 7, 14]),
    op("Gather", &[1, 11, 13]),
    op("GatherElements", &[11, 13]),
    op("GatherND", &[11, 12, 13]),
    op("Gelu", &[20]),
    op("Gemm", &[1, 6, 7, 9, 11, 13]),
    op("GlobalAveragePool", &[1]),
    op("GlobalLpPool", &[1, 2]),
    op("GlobalMaxPool", &[1]),
    op("Greater", &[1, 7, 9, 13]),
    op("GreaterOrEqual", &[12, 16]),
    missing("GridSample", &[16, 20]),
    op("GroupNormalization", &[18, 21]),
    missing("HammingWindow", &[17]),
    missing("HannWindow", &[17]),
    op("HardSigmoid", &[1, 6]),
    op("HardSwish", &[14]),
    op("Hardmax", &[1, 11, 13]),
    op("Identity", &[1, 13, 14, 16, 19, 21]),
    missing("If", &[1, 11, 13, 16, 19, 21]),
    missing("ImageDecoder", &[20]),
    op("InstanceNormalization", &[1, 6]),
    op("IsInf", &[10, 20]),
    op("IsNaN", &[9, 13, 20]),
    op("LRN", &[1, 13]),
    missing("LSTM", &[1, 7, 14]),
    op("LayerNormalization", &[17]),
    op("LeakyRelu", &[1, 6, 16]),
    op("Less", &[1, 7, 9, 13]),
    op("LessOrEqual", &[12, 16]),
    op("Log", &[1, 6, 13]),
    op("LogSoftmax", &[1, 11, 13]),
    missing("Loop", &[1, 11, 13, 16, 19, 21]),
    op("LpNormalization", &[1]),
    op("LpPool", &[1, 2, 11, 18]),
    op("MatMul", &[1, 9, 13]),
    missing("MatMulInteger", &[10]),
    op("Max", &[1, 6, 8, 12, 13]),
    op("MaxPool", &[1, 8, 10, 11, 12]),
    missing("MaxRoiPool", &[1]),
    op("MaxUnpool", &[9, 11]),
    op("Mean", &[1, 6, 8, 13]),
    op("MeanVarianceNormalization", &[9, 13]),
    missing("MelWeightMatrix", &[17]),
    op("Min", &[1, 6, 8, 12, 13]),
    op("Mish", &[18]),
    op("Mod", &[10, 13]),
    op("Mul", &[1, 6, 7, 13, 14]),
    missing("Multinomial", &[7]),
    op("Neg", &[1, 6, 13]),
    op("NegativeLogLikelihoodLoss", &[12, 13]),
    missing("NonMaxSuppression", &[10, 11]),
    op("NonZero", &[9, 13]),
    op("Not", &[1]),
    op("OneHot", &[9, 11]),
    missing("Optional", &[15]),
    missing("OptionalGetElement", &[15, 18]),
    missing("OptionalHasElement", &[15, 18]),
    op("Or", &[1, 7]),
    op("PRelu", &[1, 6, 7, 9, 16]),
    op("Pad", &[1, 2, 11, 13, 18, 19, 21]),
    op("Pow", &[1, 7, 12, 13, 15]),
    missing("QLinearConv", &[10]),
    missing("QLinearMatMul", &[10, 21]),
    missing("QuantizeLinear", &[10, 13, 19, 21]),
    missing("RNN", &[1, 7, 14]),
    missing("RandomNormal", &[1]),
    missing("RandomNormalLike", &[1]),
    missing("RandomUniform", &[1]),
    missing("RandomUniformLike", &[1]),
    op("Range", &[11]),
    op("Reciprocal", &[1, 6, 13]),
    op("ReduceL1", &[1, 11, 13, 18]),
    op("ReduceL2", &[1, 11, 13, 18]),
    op("ReduceLogSum", &[1, 11, 13, 18]),
    op("ReduceLogSumExp", &[1, 11, 13, 18]),
    op("ReduceMax", &[1, 11, 12, 13, 18, 20]),
    op("ReduceMean", &[1, 11, 13, 18]),
    op("ReduceMin", &[1, 11, 12, 13, 18, 20]),
    op("ReduceProd", &[1, 11, 13, 18]),
    op("ReduceSum", &[1, 11, 13]),
    op("ReduceSumSquare", &[1, 11, 13, 18]),
    missing("RegexFullMatch", &[20]),
    op("Relu", &[1, 6, 13, 14]),
    op("Reshape", &[1, 5, 13, 14, 19, 21]),
    op("Resize", &[10, 11, 13, 18, 19]),
    op("ReverseSequence", &[10]),
    missing("RoiAlign", &[10, 16]),
    op("Round", &[11]),
    missing("STFT", &[17]),
    missing("Scan", &[8, 9, 11, 16, 19, 21]),
    op("ScatterElements", &[11, 13, 16, 18]),
    op("ScatterND", &[11, 13, 16, 18]),
    op("Selu", &[1, 6]),
    missing("SequenceAt", &[11]),
    missing("SequenceConstruct", &[11]),
    missing("SequenceEmpty", &[11]),
    missing("SequenceErase", &[11]),
    missing("SequenceInsert", &[11]),
    missing("SequenceLength", &[11]),
    missing("SequenceMap", &[17]),
    op("Shape", &[1, 13, 15, 19, 21]),
    op("Shrink", &[9]),
    op("Sigmoid", &[1, 6, 13]),
    op("Sign", &[9, 13]),
    op("Sin", &[7]),
    op("Sinh", &[9]),
    op("Size", &[1, 13, 19, 21]),
    op("Slice", &[1, 10, 11, 13]),
    op("Softmax", &[1, 11, 13]),
    op("SoftmaxCrossEntropyLoss", &[12, 13]),
    op("Softplus", &[1]),
    op("Softsign", &[1]),
    op("SpaceToDepth", &[1, 13]),
    op("Split", &[1, 2, 11, 13, 18]),
    missing("SplitToSequence", &[11]),
    op("Sqrt", &[1, 6, 13]),
    op("Squeeze", &[1, 11, 13, 21]),
    missing("StringConcat", &[20]),
    missing("StringNormalizer", &[10]),
    missing("StringSplit", &[20]),
    op("Sub", &[1, 6, 7, 13, 14]),
    op("Sum", &[1, 6, 8, 13]),
    op("Tan", &[7]),
    op("Tanh", &[1, 6, 13]),
    missing("TfIdfVectorizer", &[9]),
    op("ThresholdedRelu", &[10]),
    op("Tile", &[1, 6, 13]),
    op("TopK", &[1, 10, 11]),
    op("Transpose", &[1, 13, 21]),
    op("Trilu", &[14]),
    missing("Unique", &[11]),
    op("Unsqueeze", &[1, 11, 13, 21]),
    op("Where", &[9, 16]),
    op("Xor", &[1, 7]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resolve(declarations: &[OpsetDeclaration]) -> (OperatorSupportTable, i64) {
        ConnxOpsetResolver.resolve(declarations)
    }

    #[test]
    fn since_versions_are_sorted_and_names_unique() {
        let mut names = std::collections::HashSet::new();
        for entry in OPERATORS {
            assert!(names.insert(entry.name), "{} listed twice", entry.name);
            assert!(!entry.since.is_empty(), "{}", entry.name);
            assert!(
                entry.since.windows(2).all(|w| w[0] < w[1]),
                "{} since versions not ascending",
                entry.name
            );
            assert!(
                entry.since.iter().all(|&v| (1..=LATEST_OPSET_VERSION).contains(&v)),
                "{}",
                entry.name
            );
        }
    }

    #[rstest]
    #[case::newest_definition("Add", 13, Some(OperatorSupport::Implemented { since_version: 13 }))]
    #[case::between_changes("Add", 12, Some(OperatorSupport::Implemented { since_version: 7 }))]
    #[case::latest("Add", 21, Some(OperatorSupport::Implemented { since_version: 14 }))]
    #[case::not_yet_defined("Gelu", 19, None)]
    #[case::defined("Gelu", 20, Some(OperatorSupport::Implemented { since_version: 20 }))]
    #[case::no_implementation("Einsum", 13, Some(OperatorSupport::NotImplemented))]
    #[case::unknown("FancyOp", 21, None)]
    fn resolve_entries(
        #[case] op_type: &str,
        #[case] version: i64,
        #[case] expected: Option<OperatorSupport>,
    ) {
        let (table, resolved) = resolve(&[OpsetDeclaration::default_domain(version)]);
        assert_eq!(resolved, version);
        assert_eq!(table.get(op_type), expected);
    }

    #[test]
    fn empty_declarations_resolve_to_version_one() {
        let (table, version) = resolve(&[]);
        assert_eq!(version, 1);
        assert!(table.is_available("Relu"));
        assert!(!table.is_available("Where"));
    }

    #[test]
    fn alias_domain_and_duplicates() {
        let (_, version) = resolve(&[OpsetDeclaration::new("ai.onnx", 11)]);
        assert_eq!(version, 11);

        let (_, version) = resolve(&[
            OpsetDeclaration::default_domain(9),
            OpsetDeclaration::new("ai.onnx", 15),
        ]);
        assert_eq!(version, 15);
    }

    #[test]
    fn other_domains_contribute_nothing() {
        let (table, version) = resolve(&[OpsetDeclaration::new("ai.onnx.ml", 3)]);
        assert_eq!(version, 0);
        assert!(table.is_empty());

        let (with_ml, _) = resolve(&[
            OpsetDeclaration::default_domain(13),
            OpsetDeclaration::new("com.microsoft", 1),
        ]);
        let (without_ml, _) = resolve(&[OpsetDeclaration::default_domain(13)]);
        assert_eq!(with_ml, without_ml);
    }

    #[test]
    fn versions_beyond_latest_use_newest_definitions() {
        let (table, version) = resolve(&[OpsetDeclaration::default_domain(30)]);
        assert_eq!(version, 30);
        assert_eq!(
            table.get("Reshape"),
            Some(OperatorSupport::Implemented { since_version: 21 })
        );
    }

    #[test]
    fn not_implemented_is_not_available() {
        let (table, _) = resolve(&[OpsetDeclaration::default_domain(LATEST_OPSET_VERSION)]);
        assert_eq!(table.get("LSTM"), Some(OperatorSupport::NotImplemented));
        assert!(!table.is_available("LSTM"));
        assert!(!table.is_available("NoSuchOp"));
        assert!(table.is_available("Conv"));
        assert!(table.iter().any(|(name, _)| name == "MatMul"));
    }
}
