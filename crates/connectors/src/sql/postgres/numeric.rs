//! Postgres NUMERIC in its binary wire form.
//!
//! The value travels as base-10000 digit groups with a group weight and a
//! display scale, so no precision is lost in either direction.

use bigdecimal::BigDecimal;
use bytes::{Buf, BufMut, BytesMut};
use num_bigint::{BigInt, Sign};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

const POSITIVE: u16 = 0x0000;
const NEGATIVE: u16 = 0x4000;
const NAN: u16 = 0xC000;
const MAX_SCALE: u16 = 0x3FFF;

type BoxError = Box<dyn Error + Sync + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub BigDecimal);

impl From<BigDecimal> for PgNumeric {
    fn from(value: BigDecimal) -> Self {
        PgNumeric(value)
    }
}

impl From<BigInt> for PgNumeric {
    fn from(value: BigInt) -> Self {
        PgNumeric(BigDecimal::new(value, 0))
    }
}

impl ToSql for PgNumeric {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let (unscaled, exponent) = self.0.as_bigint_and_exponent();
        let negative = unscaled.sign() == Sign::Minus;
        let mut digits = unscaled.magnitude().to_string();

        let scale = if exponent < 0 {
            let zeros = usize::try_from(exponent.unsigned_abs())
                .map_err(|_| format!("numeric exponent {exponent} out of range"))?;
            digits.push_str(&"0".repeat(zeros));
            0
        } else {
            u16::try_from(exponent)
                .ok()
                .filter(|scale| *scale <= MAX_SCALE)
                .ok_or_else(|| format!("numeric scale {exponent} out of range"))?
        };

        let width = usize::from(scale);
        let split = digits.len().saturating_sub(width);
        let (integer, fraction) = digits.split_at(split);
        let integer = format!("{}{integer}", "0".repeat((4 - integer.len() % 4) % 4));
        let fraction = format!("{fraction:0>width$}");
        let fraction = format!("{fraction:0<padded$}", padded = fraction.len().div_ceil(4) * 4);

        let mut groups = base_10000(&integer);
        groups.extend(base_10000(&fraction));
        let mut weight = i64::try_from(integer.len() / 4)? - 1;

        let leading = groups.iter().take_while(|g| **g == 0).count();
        groups.drain(..leading);
        weight -= i64::try_from(leading)?;
        while groups.last() == Some(&0) {
            groups.pop();
        }
        if groups.is_empty() {
            weight = 0;
        }

        let ndigits = i16::try_from(groups.len())
            .map_err(|_| format!("numeric with {} digit groups is too long", groups.len()))?;
        let weight =
            i16::try_from(weight).map_err(|_| format!("numeric weight {weight} out of range"))?;
        let sign = if negative && !groups.is_empty() {
            NEGATIVE
        } else {
            POSITIVE
        };

        out.put_i16(ndigits);
        out.put_i16(weight);
        out.put_u16(sign);
        out.put_u16(scale);
        for group in groups {
            out.put_i16(group);
        }
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() < 8 {
            return Err("numeric header is truncated".into());
        }
        let ndigits = raw.get_i16();
        let weight = raw.get_i16();
        let sign = raw.get_u16();
        let scale = raw.get_u16();

        if sign == NAN {
            return Err("NaN numeric has no decimal value".into());
        }
        let ndigits = usize::try_from(ndigits).map_err(|_| "negative numeric digit count")?;
        if raw.len() != ndigits * 2 {
            return Err(format!("numeric expects {ndigits} digit groups").into());
        }

        let mut text = String::with_capacity(ndigits * 4);
        for _ in 0..ndigits {
            text.push_str(&format!("{:04}", raw.get_i16()));
        }
        let mut unscaled = if text.is_empty() {
            BigInt::default()
        } else {
            BigInt::parse_bytes(text.as_bytes(), 10).ok_or("numeric digit group out of range")?
        };
        if sign == NEGATIVE {
            unscaled = -unscaled;
        }

        // the last group sits at 10000^(weight - ndigits + 1)
        let exponent = 4 * (i64::from(weight) - i64::try_from(ndigits)? + 1);
        let value = BigDecimal::new(unscaled, -exponent).with_scale(i64::from(scale));
        Ok(PgNumeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn base_10000(digits: &str) -> Vec<i16> {
    digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |group, digit| group * 10 + i16::from(digit - b'0'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn encode(value: &str) -> Vec<u8> {
        let mut out = BytesMut::new();
        PgNumeric(BigDecimal::from_str(value).unwrap())
            .to_sql(&Type::NUMERIC, &mut out)
            .unwrap();
        out.to_vec()
    }

    fn words(raw: &[u8]) -> Vec<i32> {
        raw.chunks(2)
            .map(|w| i32::from(u16::from_be_bytes([w[0], w[1]])))
            .collect()
    }

    #[test]
    fn encodes_digit_groups_weight_sign_and_scale() {
        assert_eq!(words(&encode("-12345.678")), vec![3, 1, 0x4000, 3, 1, 2345, 6780]);
        assert_eq!(words(&encode("0.0001")), vec![1, 0xFFFF, 0, 4, 1]);
        assert_eq!(words(&encode("0.00")), vec![0, 0, 0, 2]);
    }

    #[test]
    fn values_beyond_96_bits_keep_every_digit() {
        let huge = BigInt::from(10).pow(30);
        let mut out = BytesMut::new();
        PgNumeric::from(huge.clone())
            .to_sql(&Type::NUMERIC, &mut out)
            .unwrap();
        assert_eq!(words(&out), vec![1, 7, 0, 0, 100]);

        let decoded = PgNumeric::from_sql(&Type::NUMERIC, &out).unwrap();
        assert_eq!(decoded.0, BigDecimal::new(huge, 0));
    }

    #[test]
    fn decodes_scale_and_sign() {
        let raw = encode("-12345.678");
        let decoded = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(decoded.0.to_string(), "-12345.678");
    }

    #[test]
    fn rejects_nan_and_truncated_input() {
        let nan = [0u8, 0, 0, 0, 0xC0, 0, 0, 0];
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &nan).is_err());
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 1]).is_err());
    }
}
