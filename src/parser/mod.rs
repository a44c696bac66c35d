// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The two line-oriented reply grammars. Both parsers are tolerant of
//! truncated input: they return whatever they could recover rather than
//! failing the whole reply, matching the design's stated preference for
//! partial data over an aborted lookup.

pub(crate) mod code;
pub(crate) mod data;
