//! Client core of the Tenropes chat service.
//!
//! [`session::ChannelSession`] keeps the message feed of the channel on screen in
//! sync with the server, and [`theme::normalize`] turns a channel's authored colors
//! into a palette that stays readable.

pub mod api;
pub mod compose;
pub mod context;
pub mod feed;
pub mod models;
pub mod session;
pub mod theme;
