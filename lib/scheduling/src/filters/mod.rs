// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Filter plugins: stateless predicate stages over the candidate pods.

pub mod by_label;
pub mod label_selector;
pub mod passthrough;
pub mod random_drop;
pub mod role;
