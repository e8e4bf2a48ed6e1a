pub mod broker;
pub mod store;
pub mod tasks;
pub mod types;

pub use broker::TaskDispatcher;
pub use store::{DocumentStore, FjallDocumentStore, QueueError, UpdateFn};
pub use tasks::{LeasedTask, TaskDocument, TaskQueue};
pub use types::{Condition, Direction, Fields, ID_FIELD, Operator, Order};
