//! Excel-style reference codec: column letters, A1 cell references, and
//! rectangular range strings.

/// Converts a column letter sequence to a 0-based index.
/// "A" = 0, "Z" = 25, "AA" = 26. Case-insensitive.
/// Returns None for empty input or non-alphabetic characters.
pub fn column_letter_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for character in letters.chars() {
        if !character.is_ascii_alphabetic() {
            return None;
        }
        let digit = (character.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        index = index * 26 + digit;
    }
    Some(index - 1)
}

/// Converts a 0-based column index to its letter sequence.
/// Exact inverse of [`column_letter_to_index`] for all non-negative indices.
pub fn column_index_to_letter(index: usize) -> String {
    let mut column = index + 1;
    let mut letters = String::new();
    while column > 0 {
        column -= 1;
        let digit = char::from_u32(('A' as u32) + (column % 26) as u32).expect("Hardcode letters");
        column /= 26;
        letters.insert(0, digit);
    }
    letters
}

/// Parses an A1-style cell reference to 0-based (row, col).
/// "B3" = (2, 1). Returns None when either part is missing or malformed.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = column_letter_to_index(letters)?;
    let row = digits.parse::<usize>().ok().filter(|row| *row > 0)? - 1;
    Some((row, col))
}

/// Parses a rectangular range reference ("A1:C2") to 0-based corner pairs
/// ((row_start, col_start), (row_end, col_end)). A single cell reference
/// parses as a 1x1 range.
pub(crate) fn range_to_index(reference: &str) -> Option<((usize, usize), (usize, usize))> {
    match reference.split_once(':') {
        Some((start, end)) => {
            let start = reference_to_index(start)?;
            let end = reference_to_index(end)?;
            Some((start, end))
        }
        None => {
            let cell = reference_to_index(reference)?;
            Some((cell, cell))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_to_index_basics() {
        assert_eq!(column_letter_to_index("A"), Some(0));
        assert_eq!(column_letter_to_index("Z"), Some(25));
        assert_eq!(column_letter_to_index("AA"), Some(26));
        assert_eq!(column_letter_to_index("AZ"), Some(51));
        assert_eq!(column_letter_to_index("BA"), Some(52));
        assert_eq!(column_letter_to_index("a"), Some(0));
        assert_eq!(column_letter_to_index(""), None);
        assert_eq!(column_letter_to_index("A1"), None);
    }

    #[test]
    fn index_to_letter_basics() {
        assert_eq!(column_index_to_letter(0), "A");
        assert_eq!(column_index_to_letter(25), "Z");
        assert_eq!(column_index_to_letter(26), "AA");
        assert_eq!(column_index_to_letter(701), "ZZ");
        assert_eq!(column_index_to_letter(702), "AAA");
    }

    #[test]
    fn letter_index_round_trip() {
        for index in 0..=1000 {
            let letters = column_index_to_letter(index);
            assert_eq!(column_letter_to_index(&letters), Some(index), "index {index}");
        }
    }

    #[test]
    fn reference_parsing() {
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("B3"), Some((2, 1)));
        assert_eq!(reference_to_index("AA10"), Some((9, 26)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
    }

    #[test]
    fn range_parsing() {
        assert_eq!(range_to_index("A1:C2"), Some(((0, 0), (1, 2))));
        assert_eq!(range_to_index("B2"), Some(((1, 1), (1, 1))));
        assert_eq!(range_to_index("A1:"), None);
    }
}
