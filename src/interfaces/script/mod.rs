//! Replays a JSON-lines script of marketplace commands.
//!
//! Each line is one command tagged by `op`. Bookings and top-ups are named by
//! script-local aliases so later lines can refer to the orders earlier lines
//! opened, and a gateway signature may be left out to have the runner sign
//! the payment the way the hosted checkout would.

pub mod command_reader;
pub mod runner;
