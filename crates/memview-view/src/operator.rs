use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a where-clause or condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    /// Left value is found among all rows of the right expression.
    IsIn,
    /// Left value is found in none of the rows of the right expression.
    NotIn,
}

impl Operator {
    /// Parse an operator from its schema name (`greaterEqual`) or its symbol (`>=`).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "equal" | "=" | "==" => Some(Operator::Equal),
            "notEqual" | "!=" => Some(Operator::NotEqual),
            "greater" | ">" => Some(Operator::Greater),
            "greaterEqual" | ">=" => Some(Operator::GreaterEqual),
            "less" | "<" => Some(Operator::Less),
            "lessEqual" | "<=" => Some(Operator::LessEqual),
            "isIn" => Some(Operator::IsIn),
            "notIn" => Some(Operator::NotIn),
            _ => None,
        }
    }

    /// One-to-many operators consume every row of their right-hand side at once, so they never
    /// turn a comparison into a many-to-many join.
    pub fn is_one_to_many(self) -> bool {
        matches!(self, Operator::IsIn | Operator::NotIn)
    }

    /// Apply a scalar operator to the ordering of `left` against `right`.
    ///
    /// Membership operators are not scalar and always return `false` here.
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Operator::Equal => ordering == Ordering::Equal,
            Operator::NotEqual => ordering != Ordering::Equal,
            Operator::Greater => ordering == Ordering::Greater,
            Operator::GreaterEqual => ordering != Ordering::Less,
            Operator::Less => ordering == Ordering::Less,
            Operator::LessEqual => ordering != Ordering::Greater,
            Operator::IsIn | Operator::NotIn => false,
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            Operator::Equal => Operator::NotEqual,
            Operator::NotEqual => Operator::Equal,
            Operator::Greater => Operator::LessEqual,
            Operator::GreaterEqual => Operator::Less,
            Operator::Less => Operator::GreaterEqual,
            Operator::LessEqual => Operator::Greater,
            Operator::IsIn => Operator::NotIn,
            Operator::NotIn => Operator::IsIn,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::IsIn => "isIn",
            Operator::NotIn => "notIn",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
