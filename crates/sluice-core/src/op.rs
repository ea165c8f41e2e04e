use strum_macros::{Display, EnumIter};

#[cfg(test)]
use test_strategy::Arbitrary;

/// Elementwise operations understood by the dispatcher.
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    /// Copy with conversion from the input dtype to the output dtype.
    Identity,
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    Power,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    LogicalAnd,
    LogicalOr,
    Negative,
    Absolute,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    LogicalNot,
}

impl Opcode {
    /// Number of inputs, the output excluded.
    pub fn arity(&self) -> usize {
        use Opcode::*;
        match self {
            Identity | Negative | Absolute | Sqrt | Exp | Log | Sin | Cos | LogicalNot => 1,
            _ => 2,
        }
    }

    /// Comparisons and logical operations write a bool output.
    pub fn is_predicate(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Less | LessEqual
                | Greater
                | GreaterEqual
                | Equal
                | NotEqual
                | LogicalAnd
                | LogicalOr
                | LogicalNot
        )
    }

    /// Only float dtypes provide these.
    pub fn is_transcendental(&self) -> bool {
        use Opcode::*;
        matches!(self, Sqrt | Exp | Log | Sin | Cos)
    }

    /// Operations with a reduction entry point.
    pub fn is_reducible(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Add | Multiply | Maximum | Minimum | LogicalAnd | LogicalOr
        )
    }

    /// Operations with an accumulation (scan) entry point.
    pub fn is_accumulable(&self) -> bool {
        matches!(self, Opcode::Add | Opcode::Multiply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use test_strategy::proptest;

    #[test]
    fn names_are_snake_case() {
        assert_eq!(Opcode::LessEqual.to_string(), "less_equal");
        assert_eq!(Opcode::Identity.to_string(), "identity");
    }

    #[test]
    fn arity_split() {
        let unary = Opcode::iter().filter(|op| op.arity() == 1).count();
        assert_eq!(unary, 9);
        assert_eq!(Opcode::iter().count() - unary, 15);
    }

    #[proptest]
    fn scans_are_reductions(op: Opcode) {
        if op.is_accumulable() {
            assert!(op.is_reducible());
        }
    }
}
