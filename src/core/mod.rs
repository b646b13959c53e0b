pub mod eol_indexes;
pub(crate) mod lines;
pub mod text;
