//! Content properties: a sparse, class-specific set of metadata fields
//! carried by the content-header frame, encoded as a presence bitmap
//! followed by the present non-bit values in declaration order.
//!
//! Only `basic.BasicProperties` is in scope (it is the sole content-bearing
//! class, see SPEC_FULL §4.3), but the bitmap algorithm itself is written
//! generically over a declared property list so a second content-bearing
//! class could be added without touching the bitmap logic.

use crate::codec::field_table::{pack_field_table, unpack_field_table, FieldTable};
use crate::codec::primitive::{
    pack_octet, pack_short, pack_short_string, pack_timestamp, unpack_octet, unpack_short,
    unpack_short_string, unpack_timestamp,
};
use crate::error::{AmqpError, AmqpResult};

/// `basic.BasicProperties`, the content property set for every
/// content-bearing `basic.*` method (Publish/Deliver/Return/Get-Ok).
///
/// Declaration order (significant, it fixes both bit position and
/// serialisation order): content_type, content_encoding, headers,
/// delivery_mode, priority, correlation_id, reply_to, expiration,
/// message_id, timestamp, type_, user_id, app_id, cluster_id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub type_: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

/// The number of declared properties; used to bound the bitmap against
/// out-of-range bits on unpack.
const PROPERTY_COUNT: usize = 14;

impl BasicProperties {
    /// Whether each of the 14 declared properties is present, in
    /// declaration order. None of the declared properties is bit-typed in
    /// this class, so "present" is simply "set at all".
    fn presence(&self) -> [bool; PROPERTY_COUNT] {
        [
            self.content_type.is_some(),
            self.content_encoding.is_some(),
            self.headers.is_some(),
            self.delivery_mode.is_some(),
            self.priority.is_some(),
            self.correlation_id.is_some(),
            self.reply_to.is_some(),
            self.expiration.is_some(),
            self.message_id.is_some(),
            self.timestamp.is_some(),
            self.type_.is_some(),
            self.user_id.is_some(),
            self.app_id.is_some(),
            self.cluster_id.is_some(),
        ]
    }

    pub fn pack(&self) -> AmqpResult<Vec<u8>> {
        let presence = self.presence();
        let mut masks = Vec::new();
        let mut values = Vec::new();
        let mut index = 0usize;
        while index < PROPERTY_COUNT {
            let mut mask: u16 = 0;
            // bits 15..1 of this word hold up to 15 properties, highest first.
            for bit in (1..=15).rev() {
                if index >= PROPERTY_COUNT {
                    break;
                }
                if presence[index] {
                    mask |= 1 << bit;
                }
                index += 1;
            }
            if index < PROPERTY_COUNT {
                mask |= 1; // continuation bit: another word follows
            }
            masks.push(mask);
        }
        self.append_present_values(&mut values)?;

        let mut buf = Vec::new();
        for mask in masks {
            pack_short(&mut buf, mask);
        }
        buf.extend(values);
        Ok(buf)
    }

    fn append_present_values(&self, buf: &mut Vec<u8>) -> AmqpResult<()> {
        if let Some(v) = &self.content_type {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.content_encoding {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.headers {
            pack_field_table(buf, v)?;
        }
        if let Some(v) = self.delivery_mode {
            pack_octet(buf, v);
        }
        if let Some(v) = self.priority {
            pack_octet(buf, v);
        }
        if let Some(v) = &self.correlation_id {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.reply_to {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.expiration {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.message_id {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = self.timestamp {
            pack_timestamp(buf, v);
        }
        if let Some(v) = &self.type_ {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.user_id {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.app_id {
            pack_short_string(buf, v)?;
        }
        if let Some(v) = &self.cluster_id {
            pack_short_string(buf, v)?;
        }
        Ok(())
    }

    pub fn unpack(data: &[u8]) -> AmqpResult<(BasicProperties, &[u8])> {
        let mut present = [false; PROPERTY_COUNT];
        let mut data = data;
        let mut index = 0usize;
        loop {
            let (mask, rest) = unpack_short(data)?;
            data = rest;
            for bit in (1..=15).rev() {
                if index >= PROPERTY_COUNT {
                    if mask & (1 << bit) != 0 {
                        return Err(AmqpError::SyntaxError {
                            reason: "basic properties bitmap set a bit beyond the declared property list".to_owned(),
                        });
                    }
                    index += 1;
                    continue;
                }
                present[index] = mask & (1 << bit) != 0;
                index += 1;
            }
            if mask & 1 == 0 {
                break;
            }
        }

        let mut props = BasicProperties::default();
        if present[0] {
            let (v, rest) = unpack_short_string(data)?;
            props.content_type = Some(v);
            data = rest;
        }
        if present[1] {
            let (v, rest) = unpack_short_string(data)?;
            props.content_encoding = Some(v);
            data = rest;
        }
        if present[2] {
            let (v, rest) = unpack_field_table(data)?;
            props.headers = Some(v);
            data = rest;
        }
        if present[3] {
            let (v, rest) = unpack_octet(data)?;
            props.delivery_mode = Some(v);
            data = rest;
        }
        if present[4] {
            let (v, rest) = unpack_octet(data)?;
            props.priority = Some(v);
            data = rest;
        }
        if present[5] {
            let (v, rest) = unpack_short_string(data)?;
            props.correlation_id = Some(v);
            data = rest;
        }
        if present[6] {
            let (v, rest) = unpack_short_string(data)?;
            props.reply_to = Some(v);
            data = rest;
        }
        if present[7] {
            let (v, rest) = unpack_short_string(data)?;
            props.expiration = Some(v);
            data = rest;
        }
        if present[8] {
            let (v, rest) = unpack_short_string(data)?;
            props.message_id = Some(v);
            data = rest;
        }
        if present[9] {
            let (v, rest) = unpack_timestamp(data)?;
            props.timestamp = Some(v);
            data = rest;
        }
        if present[10] {
            let (v, rest) = unpack_short_string(data)?;
            props.type_ = Some(v);
            data = rest;
        }
        if present[11] {
            let (v, rest) = unpack_short_string(data)?;
            props.user_id = Some(v);
            data = rest;
        }
        if present[12] {
            let (v, rest) = unpack_short_string(data)?;
            props.app_id = Some(v);
            data = rest;
        }
        if present[13] {
            let (v, rest) = unpack_short_string(data)?;
            props.cluster_id = Some(v);
            data = rest;
        }
        Ok((props, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_properties_round_trip_to_a_single_zero_word() {
        let props = BasicProperties::default();
        let packed = props.pack().unwrap();
        assert_eq!(packed, vec![0, 0]);
        let (back, rest) = BasicProperties::unpack(&packed).unwrap();
        assert_eq!(back, props);
        assert!(rest.is_empty());
    }

    #[test]
    fn present_values_round_trip_in_declaration_order() {
        let props = BasicProperties {
            content_type: Some("text/plain".to_owned()),
            delivery_mode: Some(2),
            message_id: Some("abc".to_owned()),
            ..BasicProperties::default()
        };
        let packed = props.pack().unwrap();
        let (back, rest) = BasicProperties::unpack(&packed).unwrap();
        assert_eq!(back, props);
        assert!(rest.is_empty());
    }

    #[test]
    fn all_fourteen_properties_need_a_single_word_with_no_continuation() {
        let props = BasicProperties {
            content_type: Some("t".to_owned()),
            content_encoding: Some("e".to_owned()),
            headers: Some(FieldTable::new()),
            delivery_mode: Some(1),
            priority: Some(0),
            correlation_id: Some("c".to_owned()),
            reply_to: Some("r".to_owned()),
            expiration: Some("60000".to_owned()),
            message_id: Some("m".to_owned()),
            timestamp: Some(0),
            type_: Some("ty".to_owned()),
            user_id: Some("u".to_owned()),
            app_id: Some("a".to_owned()),
            cluster_id: Some("cl".to_owned()),
        };
        let packed = props.pack().unwrap();
        // 14 properties fit in bits 15..2 of a single word: no continuation bit needed.
        let first_word = u16::from_be_bytes([packed[0], packed[1]]);
        assert_eq!(first_word & 1, 0);
        let (back, _rest) = BasicProperties::unpack(&packed).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn out_of_range_bit_is_a_syntax_error() {
        // All 14 declared properties fit in one word (bits 15..2), leaving
        // bit 0 free for a (here, lying) continuation flag. A forced second
        // word then sets a bit past the last declared property.
        let mut buf = Vec::new();
        pack_short(&mut buf, 1); // continuation bit set, no properties present
        pack_short(&mut buf, 0b1000_0000_0000_0000); // bit 15 -> property index 14, out of range
        assert!(BasicProperties::unpack(&buf).is_err());
    }
}
