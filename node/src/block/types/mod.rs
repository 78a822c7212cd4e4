pub mod block;
pub mod output;
pub mod subblock;
pub mod transaction;
