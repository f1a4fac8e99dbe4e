// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod backend;
pub mod cfg;
pub mod digest;
pub mod pdu;
pub mod port;
pub mod queue;
pub mod registry;
pub mod state_machine;
pub mod worker;
