pub mod waiting_model;
#[cfg(test)]
mod waiting_model_tests;

pub use waiting_model::WaitingModel;
