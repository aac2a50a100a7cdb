// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Profile-handler plugins: decide which profiles run for a request and
//! fuse their outcomes into one scheduling result.

pub mod pd;
pub mod single;
