pub mod terminal_ui;

pub use terminal_ui::TerminalUi;
