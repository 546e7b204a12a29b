use std::fmt;

/// Static type carried by every tree node and operator parameter.
///
/// Operator signatures may contain `Var` placeholders which get
/// substituted with concrete types during resolution. Everywhere else
/// types are fully concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    /// In-memory sequence of elements.
    Seq(Box<DataType>),
    /// Deferred query producing elements of the given type.
    Query(Box<DataType>),
    /// Grouping of elements under a key, as produced by `group_by`.
    Group(Box<DataType>, Box<DataType>),
    /// Fixed array of elements.
    Array(Box<DataType>),
    /// Plain callable.
    Func(FuncType),
    /// Lambda that must remain a tree rather than become a callable.
    Quoted(FuncType),
    /// Generic placeholder in an unsubstituted operator signature.
    Var(usize),
    /// Matches any type.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub params: Vec<DataType>,
    pub return_type: Box<DataType>,
}

impl DataType {
    pub fn seq(elem: DataType) -> Self {
        DataType::Seq(Box::new(elem))
    }

    pub fn query(elem: DataType) -> Self {
        DataType::Query(Box::new(elem))
    }

    pub fn group(key: DataType, elem: DataType) -> Self {
        DataType::Group(Box::new(key), Box::new(elem))
    }

    pub fn array(elem: DataType) -> Self {
        DataType::Array(Box::new(elem))
    }

    pub fn func(params: impl IntoIterator<Item = DataType>, return_type: DataType) -> Self {
        DataType::Func(FuncType {
            params: params.into_iter().collect(),
            return_type: Box::new(return_type),
        })
    }

    pub fn quoted(params: impl IntoIterator<Item = DataType>, return_type: DataType) -> Self {
        DataType::Quoted(FuncType {
            params: params.into_iter().collect(),
            return_type: Box::new(return_type),
        })
    }

    /// Element type produced when iterating a value of this type.
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Seq(elem) | DataType::Query(elem) | DataType::Array(elem) => Some(elem),
            DataType::Group(_, elem) => Some(elem),
            _ => None,
        }
    }

    /// Check if a value statically typed as `have` can fill a position
    /// declared as `self`.
    ///
    /// Deferred queries, arrays and groupings all iterate as sequences,
    /// so a `Seq` position accepts any of them. A `Func` position never
    /// accepts a `Quoted` argument; that conversion is the rewriter's
    /// explicit quote-unwrap fix-up and is scored separately.
    pub fn is_assignable_from(&self, have: &DataType) -> bool {
        match (self, have) {
            (DataType::Any, _) | (_, DataType::Any) => true,
            // Unsubstituted placeholders only show up while matching
            // generic signatures, where they stand for "anything".
            (DataType::Var(_), _) | (_, DataType::Var(_)) => true,
            (DataType::Seq(want), have) => match have {
                DataType::Seq(elem)
                | DataType::Query(elem)
                | DataType::Array(elem)
                | DataType::Group(_, elem) => want.is_assignable_from(elem),
                _ => false,
            },
            (DataType::Query(want), DataType::Query(have)) => want.is_assignable_from(have),
            (DataType::Array(want), DataType::Array(have)) => want.is_assignable_from(have),
            (DataType::Group(wk, we), DataType::Group(hk, he)) => {
                wk.is_assignable_from(hk) && we.is_assignable_from(he)
            }
            (DataType::Func(want), DataType::Func(have)) => func_assignable(want, have),
            (DataType::Quoted(want), DataType::Quoted(have)) => func_assignable(want, have),
            (want, have) => want == have,
        }
    }

    /// Replace `Var(n)` placeholders with the provided type arguments.
    ///
    /// Placeholders without a corresponding argument are left in place;
    /// callers validate generic arity before substituting.
    pub fn substitute(&self, type_args: &[DataType]) -> DataType {
        match self {
            DataType::Var(n) => type_args.get(*n).cloned().unwrap_or(DataType::Var(*n)),
            DataType::Seq(elem) => DataType::seq(elem.substitute(type_args)),
            DataType::Query(elem) => DataType::query(elem.substitute(type_args)),
            DataType::Array(elem) => DataType::array(elem.substitute(type_args)),
            DataType::Group(key, elem) => {
                DataType::group(key.substitute(type_args), elem.substitute(type_args))
            }
            DataType::Func(func) => DataType::Func(substitute_func(func, type_args)),
            DataType::Quoted(func) => DataType::Quoted(substitute_func(func, type_args)),
            other => other.clone(),
        }
    }

    /// Strip quote wrappers from this type, recursing through arrays.
    ///
    /// `Quoted<f>` becomes `Func<f>`, `Array<Quoted<f>>` becomes
    /// `Array<Func<f>>` at any nesting depth. Types without a quote
    /// wrapper are returned unchanged.
    pub fn unquoted(&self) -> DataType {
        match self {
            DataType::Quoted(func) => DataType::Func(func.clone()),
            DataType::Array(elem) => DataType::array(elem.unquoted()),
            other => other.clone(),
        }
    }
}

fn func_assignable(want: &FuncType, have: &FuncType) -> bool {
    want.params.len() == have.params.len()
        && want
            .params
            .iter()
            .zip(&have.params)
            .all(|(w, h)| w.is_assignable_from(h))
        && want.return_type.is_assignable_from(&have.return_type)
}

fn substitute_func(func: &FuncType, type_args: &[DataType]) -> FuncType {
    FuncType {
        params: func.params.iter().map(|p| p.substitute(type_args)).collect(),
        return_type: Box::new(func.return_type.substitute(type_args)),
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "Null"),
            DataType::Bool => write!(f, "Bool"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::Utf8 => write!(f, "Utf8"),
            DataType::Seq(elem) => write!(f, "Seq<{elem}>"),
            DataType::Query(elem) => write!(f, "Query<{elem}>"),
            DataType::Group(key, elem) => write!(f, "Group<{key}, {elem}>"),
            DataType::Array(elem) => write!(f, "Array<{elem}>"),
            DataType::Func(func) => write!(f, "Func<{func}>"),
            DataType::Quoted(func) => write!(f, "Quoted<{func}>"),
            DataType::Var(n) => write!(f, "T{n}"),
            DataType::Any => write!(f, "Any"),
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_accepts_iterables() {
        let want = DataType::seq(DataType::Int64);

        assert!(want.is_assignable_from(&DataType::seq(DataType::Int64)));
        assert!(want.is_assignable_from(&DataType::query(DataType::Int64)));
        assert!(want.is_assignable_from(&DataType::array(DataType::Int64)));
        assert!(want.is_assignable_from(&DataType::group(DataType::Utf8, DataType::Int64)));

        assert!(!want.is_assignable_from(&DataType::seq(DataType::Utf8)));
        assert!(!want.is_assignable_from(&DataType::Int64));
    }

    #[test]
    fn query_not_assignable_from_seq() {
        // A materialized sequence can't fill a deferred-query position.
        let want = DataType::query(DataType::Int64);
        assert!(!want.is_assignable_from(&DataType::seq(DataType::Int64)));
    }

    #[test]
    fn func_does_not_accept_quoted() {
        let want = DataType::func([DataType::Int64], DataType::Bool);
        let quoted = DataType::quoted([DataType::Int64], DataType::Bool);

        assert!(!want.is_assignable_from(&quoted));
        assert!(want.is_assignable_from(&quoted.unquoted()));
    }

    #[test]
    fn unquote_inside_array() {
        let have = DataType::array(DataType::quoted([DataType::Int64], DataType::Int64));
        let want = DataType::array(DataType::func([DataType::Int64], DataType::Int64));

        assert!(!want.is_assignable_from(&have));
        assert!(want.is_assignable_from(&have.unquoted()));
    }

    #[test]
    fn substitute_vars() {
        let sig = DataType::func([DataType::Var(0)], DataType::Var(1));
        let got = sig.substitute(&[DataType::Int64, DataType::Bool]);
        assert_eq!(DataType::func([DataType::Int64], DataType::Bool), got);
    }
}
