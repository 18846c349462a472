// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The manager RPC server.

#![deny(clippy::all)]

mod server;

pub use server::{MSG_BAD_REQUEST, bind, serve};
