pub mod irtree;
pub mod node;
pub mod query;
pub mod serializer;
