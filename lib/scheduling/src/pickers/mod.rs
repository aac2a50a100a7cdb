// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Picker plugins: reduce the scored candidates to the profile's targets.

pub mod max_score;
pub mod random;
