//! Channel transports.

pub mod telegram;

pub use telegram::TelegramDelivery;
