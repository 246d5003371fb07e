//! Domain types for the backtesting kernel.

pub mod account;
pub mod bar;
pub mod ids;
pub mod mark;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use account::AccountInfo;
pub use bar::Bar;
pub use ids::{MarkId, MarkIdGen, OrderId};
pub use mark::{Mark, MarkLevel, MarkShape};
pub use order::{
    Attachment, ExecuteOrder, FailureReason, Order, OrderKind, OrderSide, OrderStatus,
    PositionType,
};
pub use position::Position;
pub use signal::{Signal, SignalType};
pub use trade::Trade;

/// Symbol type alias, matching the teacher's convention.
pub type Symbol = String;
