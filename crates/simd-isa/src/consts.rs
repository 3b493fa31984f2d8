//! OpenCL reserved constants accepted wherever an immediate is.

/// Look up an OpenCL reserved constant by name, with optional `-` prefix.
/// Returns the 32-bit immediate encoding.
pub fn reserved_const(name: &str) -> Option<u32> {
    let (neg, name) = match name.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, name),
    };

    // (value, is_float) pairs for 32-bit platforms.
    let (value, float): (u32, bool) = match name {
        "FLT_DIG" => (6, false),
        "FLT_MANT_DIG" => (24, false),
        "FLT_MAX_10_EXP" => (38, false),
        "FLT_MAX_EXP" => (128, false),
        "FLT_MIN_10_EXP" => ((-37i32) as u32, false),
        "FLT_MIN_EXP" => ((-128i32) as u32, false),
        "FLT_RADIX" => (2, false),
        "FLT_MAX" => (0x7f7fffff, true),
        "FLT_MIN" => (0x00800000, true),
        "FLT_EPSILON" => (0x34000000, true),
        "M_PI_F" => (0x40490fdb, true),
        "M_2PI_F" => (0x40c90fdb, true),
        "M_E_F" => (0x402df854, true),
        _ => return None,
    };

    Some(match (neg, float) {
        (false, _) => value,
        (true, true) => value ^ 0x8000_0000,
        (true, false) => (value as i32).wrapping_neg() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_constants_are_bit_patterns() {
        assert_eq!(reserved_const("M_PI_F"), Some(std::f32::consts::PI.to_bits()));
        assert_eq!(
            reserved_const("-M_PI_F"),
            Some((-std::f32::consts::PI).to_bits())
        );
    }

    #[test]
    fn integer_constants_negate_arithmetically() {
        assert_eq!(reserved_const("FLT_RADIX"), Some(2));
        assert_eq!(reserved_const("-FLT_RADIX"), Some((-2i32) as u32));
    }

    #[test]
    fn unknown_name() {
        assert_eq!(reserved_const("NOT_A_CONST"), None);
    }
}
