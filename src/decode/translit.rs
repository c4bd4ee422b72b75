/// Latin sequences and their Cyrillic replacements, longest first.
const TABLE: &[(&str, &str)] = &[
    ("sch", "щ"),
    ("Sch", "Щ"),
    ("zh", "ж"),
    ("Zh", "Ж"),
    ("ch", "ч"),
    ("Ch", "Ч"),
    ("sh", "ш"),
    ("Sh", "Ш"),
    ("yu", "ю"),
    ("Yu", "Ю"),
    ("ya", "я"),
    ("Ya", "Я"),
    ("a", "а"),
    ("b", "б"),
    ("v", "в"),
    ("g", "г"),
    ("d", "д"),
    ("e", "е"),
    ("z", "з"),
    ("i", "и"),
    ("j", "й"),
    ("k", "к"),
    ("l", "л"),
    ("m", "м"),
    ("n", "н"),
    ("o", "о"),
    ("p", "п"),
    ("r", "р"),
    ("s", "с"),
    ("t", "т"),
    ("u", "у"),
    ("f", "ф"),
    ("h", "х"),
    ("c", "ц"),
    ("y", "ы"),
    ("'", "ь"),
    ("A", "А"),
    ("B", "Б"),
    ("V", "В"),
    ("G", "Г"),
    ("D", "Д"),
    ("E", "Е"),
    ("Z", "З"),
    ("I", "И"),
    ("J", "Й"),
    ("K", "К"),
    ("L", "Л"),
    ("M", "М"),
    ("N", "Н"),
    ("O", "О"),
    ("P", "П"),
    ("R", "Р"),
    ("S", "С"),
    ("T", "Т"),
    ("U", "У"),
    ("F", "Ф"),
    ("H", "Х"),
    ("C", "Ц"),
    ("Y", "Ы"),
];

/// Transliterates Latin text typed on a keyboard-wedge scanner into Cyrillic.
///
/// This is a manual fallback and never part of the automatic cascade.
/// Characters without a mapping pass through.
///
/// ```
/// assert_eq!("щука", scanlink::latin_to_cyrillic("schuka"));
/// ```
#[must_use]
pub fn latin_to_cyrillic(input: &str) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        match TABLE.iter().find(|(latin, _)| rest.starts_with(latin)) {
            Some((latin, cyrillic)) => {
                output.push_str(cyrillic);
                rest = &rest[latin.len()..];
            }
            None => {
                output.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::longest_match_first("borsch", "борщ")]
    #[case::digraphs("zhuk chay shar", "жук чаы шар")]
    #[case::title_case("Yulya", "Юля")]
    #[case::soft_sign("sol'", "соль")]
    #[case::digits_and_punctuation_pass_through("PART-123", "ПАРТ-123")]
    #[case::empty("", "")]
    fn transliterates(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expected, latin_to_cyrillic(input));
    }
}
