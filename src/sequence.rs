
/// Numeric code for 'A'/'a'
pub const BASE_A: u8 = 0;
/// Numeric code for 'C'/'c'
pub const BASE_C: u8 = 1;
/// Numeric code for 'G'/'g'
pub const BASE_G: u8 = 2;
/// Numeric code for 'T'/'t'
pub const BASE_T: u8 = 3;
/// Numeric code for anything else
pub const BASE_N: u8 = 4;

/// Converts a single base character to its numeric form.
/// Anything outside {A,C,G,T} (either case) maps to N.
/// # Arguments
/// * `c` - the base character
pub fn base_to_num(c: u8) -> u8 {
    match c {
        b'A' | b'a' => BASE_A,
        b'C' | b'c' => BASE_C,
        b'G' | b'g' => BASE_G,
        b'T' | b't' => BASE_T,
        _ => BASE_N
    }
}

/// Converts a numeric base back to an upper-case character.
/// All ambiguous codes render as 'N'.
/// # Arguments
/// * `num` - the numeric base
pub fn num_to_base(num: u8) -> u8 {
    match num {
        BASE_A => b'A',
        BASE_C => b'C',
        BASE_G => b'G',
        BASE_T => b'T',
        _ => b'N'
    }
}

/// Converts a character sequence into a numeric sequence.
/// # Arguments
/// * `seq` - the ASCII sequence to convert
pub fn seq_to_num(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&c| base_to_num(c)).collect()
}

/// Converts a numeric sequence back into an upper-case base string.
/// # Arguments
/// * `num` - the numeric sequence to convert
pub fn num_to_seq(num: &[u8]) -> String {
    // codes are guaranteed to render as ASCII from {A,C,G,T,N}
    let bytes: Vec<u8> = num.iter().map(|&n| num_to_base(n)).collect();
    String::from_utf8(bytes).unwrap_or_default()
}
