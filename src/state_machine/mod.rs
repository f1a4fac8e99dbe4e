// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod common;
