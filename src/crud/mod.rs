//! Schema-driven row editing: column metadata in, parameterized writes out.

pub mod codec;
pub mod form;
pub mod statement;

pub use codec::EditableField;
pub use form::{delete_row, CrudForm, FormMode, FormState};
