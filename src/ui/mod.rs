//! Terminal front end: role login, table browser, forms and dialogs.

mod components;
mod handlers;
mod screens;

pub use components::{ConsoleUI, FocusedWidget, FormInput, Popup, RoutineInput, ScreenState, SearchInput};
