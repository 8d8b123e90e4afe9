pub mod dispatcher;
pub mod instrument;
pub mod order_id;
pub mod registry;
pub mod session;
