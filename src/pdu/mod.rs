// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-format NVMe/TCP PDU definitions: one module per PDU type, plus
//! the shared generic header in [`common`].

pub mod c2h_data;
pub mod cmd;
pub mod common;
pub mod h2c_data;
pub mod icreq;
pub mod icresp;
pub mod r2t;
pub mod rsp;
