//! Query parsing: pagination/sort/attribute-filter/search parameters into a
//! validated, engine-agnostic descriptor, plus the operator vocabulary.

pub mod builder;
pub mod operators;

pub use builder::{
    PageLimit, QueryBuilder, QueryConfig, QueryDescriptor, QueryParams, SortOrder, SubInclude,
};
pub use operators::{replace_operators, OperatorWhitelist, SearchOperator, WhitelistCheck};
