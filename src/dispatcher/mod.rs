pub mod cost;
pub mod dispatcher;

pub use cost::CostStrategy;
pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherEvent;
pub use dispatcher::DispatcherTuning;
pub use dispatcher::PickMode;
