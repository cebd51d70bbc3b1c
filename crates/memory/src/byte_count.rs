// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use bytesize::ByteSize;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};

/// Serializes a [`ByteSize`] as its exact number of bytes. Reads back either a number of bytes
/// or a human-readable string such as `"256 MiB"`.
pub struct ByteCount;

impl SerializeAs<ByteSize> for ByteCount {
    fn serialize_as<S>(source: &ByteSize, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(source.as_u64())
    }
}

impl<'de> DeserializeAs<'de, ByteSize> for ByteCount {
    fn deserialize_as<D>(deserializer: D) -> Result<ByteSize, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ByteCountVisitor)
        } else {
            deserializer.deserialize_u64(ByteCountVisitor)
        }
    }
}

struct ByteCountVisitor;

impl Visitor<'_> for ByteCountVisitor {
    type Value = ByteSize;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a number of bytes or a human-readable byte count string")
    }

    // toml integers are i64
    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(ByteSize::b)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &"a positive number"))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(ByteSize::b(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse::<ByteSize>().map_err(|_| {
            E::invalid_value(
                de::Unexpected::Str(value),
                &"a human-readable byte count string",
            )
        })
    }
}
