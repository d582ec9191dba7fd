use once_cell::sync::Lazy;
use std::collections::HashMap;

// Named character references. Pure data: no environment lookup is ever
// consulted, so decoding behaves identically everywhere. The set covers the
// references that show up in real documents; unknown names pass through
// undecoded.
static NAMED_ENTITIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let pairs: &[(&str, &str)] = &[
        ("AElig", "\u{00C6}"),
        ("Aacute", "\u{00C1}"),
        ("Agrave", "\u{00C0}"),
        ("Alpha", "\u{0391}"),
        ("Aring", "\u{00C5}"),
        ("Auml", "\u{00C4}"),
        ("Beta", "\u{0392}"),
        ("Ccedil", "\u{00C7}"),
        ("Dagger", "\u{2021}"),
        ("Delta", "\u{0394}"),
        ("Eacute", "\u{00C9}"),
        ("Egrave", "\u{00C8}"),
        ("Euml", "\u{00CB}"),
        ("Gamma", "\u{0393}"),
        ("Iacute", "\u{00CD}"),
        ("Lambda", "\u{039B}"),
        ("Ntilde", "\u{00D1}"),
        ("OElig", "\u{0152}"),
        ("Oacute", "\u{00D3}"),
        ("Omega", "\u{03A9}"),
        ("Oslash", "\u{00D8}"),
        ("Ouml", "\u{00D6}"),
        ("Phi", "\u{03A6}"),
        ("Pi", "\u{03A0}"),
        ("Psi", "\u{03A8}"),
        ("Sigma", "\u{03A3}"),
        ("Theta", "\u{0398}"),
        ("Uacute", "\u{00DA}"),
        ("Uuml", "\u{00DC}"),
        ("Xi", "\u{039E}"),
        ("Yacute", "\u{00DD}"),
        ("aacute", "\u{00E1}"),
        ("acirc", "\u{00E2}"),
        ("acute", "\u{00B4}"),
        ("aelig", "\u{00E6}"),
        ("agrave", "\u{00E0}"),
        ("alpha", "\u{03B1}"),
        ("amp", "&"),
        ("and", "\u{2227}"),
        ("ang", "\u{2220}"),
        ("apos", "'"),
        ("aring", "\u{00E5}"),
        ("asymp", "\u{2248}"),
        ("atilde", "\u{00E3}"),
        ("auml", "\u{00E4}"),
        ("bdquo", "\u{201E}"),
        ("beta", "\u{03B2}"),
        ("brvbar", "\u{00A6}"),
        ("bull", "\u{2022}"),
        ("cap", "\u{2229}"),
        ("ccedil", "\u{00E7}"),
        ("cedil", "\u{00B8}"),
        ("cent", "\u{00A2}"),
        ("chi", "\u{03C7}"),
        ("circ", "\u{02C6}"),
        ("clubs", "\u{2663}"),
        ("cong", "\u{2245}"),
        ("copy", "\u{00A9}"),
        ("crarr", "\u{21B5}"),
        ("cup", "\u{222A}"),
        ("curren", "\u{00A4}"),
        ("dagger", "\u{2020}"),
        ("darr", "\u{2193}"),
        ("deg", "\u{00B0}"),
        ("delta", "\u{03B4}"),
        ("diams", "\u{2666}"),
        ("divide", "\u{00F7}"),
        ("eacute", "\u{00E9}"),
        ("ecirc", "\u{00EA}"),
        ("egrave", "\u{00E8}"),
        ("empty", "\u{2205}"),
        ("emsp", "\u{2003}"),
        ("ensp", "\u{2002}"),
        ("epsilon", "\u{03B5}"),
        ("equiv", "\u{2261}"),
        ("eta", "\u{03B7}"),
        ("eth", "\u{00F0}"),
        ("euml", "\u{00EB}"),
        ("euro", "\u{20AC}"),
        ("exist", "\u{2203}"),
        ("fnof", "\u{0192}"),
        ("forall", "\u{2200}"),
        ("frac12", "\u{00BD}"),
        ("frac14", "\u{00BC}"),
        ("frac34", "\u{00BE}"),
        ("frasl", "\u{2044}"),
        ("gamma", "\u{03B3}"),
        ("ge", "\u{2265}"),
        ("gt", ">"),
        ("harr", "\u{2194}"),
        ("hearts", "\u{2665}"),
        ("hellip", "\u{2026}"),
        ("iacute", "\u{00ED}"),
        ("icirc", "\u{00EE}"),
        ("iexcl", "\u{00A1}"),
        ("igrave", "\u{00EC}"),
        ("infin", "\u{221E}"),
        ("int", "\u{222B}"),
        ("iota", "\u{03B9}"),
        ("iquest", "\u{00BF}"),
        ("isin", "\u{2208}"),
        ("iuml", "\u{00EF}"),
        ("kappa", "\u{03BA}"),
        ("lambda", "\u{03BB}"),
        ("lang", "\u{27E8}"),
        ("laquo", "\u{00AB}"),
        ("larr", "\u{2190}"),
        ("lceil", "\u{2308}"),
        ("ldquo", "\u{201C}"),
        ("le", "\u{2264}"),
        ("lfloor", "\u{230A}"),
        ("lowast", "\u{2217}"),
        ("loz", "\u{25CA}"),
        ("lrm", "\u{200E}"),
        ("lsaquo", "\u{2039}"),
        ("lsquo", "\u{2018}"),
        ("lt", "<"),
        ("macr", "\u{00AF}"),
        ("mdash", "\u{2014}"),
        ("micro", "\u{00B5}"),
        ("middot", "\u{00B7}"),
        ("minus", "\u{2212}"),
        ("mu", "\u{03BC}"),
        ("nabla", "\u{2207}"),
        ("nbsp", "\u{00A0}"),
        ("ndash", "\u{2013}"),
        ("ne", "\u{2260}"),
        ("ni", "\u{220B}"),
        ("not", "\u{00AC}"),
        ("notin", "\u{2209}"),
        ("nsub", "\u{2284}"),
        ("ntilde", "\u{00F1}"),
        ("nu", "\u{03BD}"),
        ("oacute", "\u{00F3}"),
        ("ocirc", "\u{00F4}"),
        ("oelig", "\u{0153}"),
        ("ograve", "\u{00F2}"),
        ("oline", "\u{203E}"),
        ("omega", "\u{03C9}"),
        ("oplus", "\u{2295}"),
        ("or", "\u{2228}"),
        ("ordf", "\u{00AA}"),
        ("ordm", "\u{00BA}"),
        ("oslash", "\u{00F8}"),
        ("otilde", "\u{00F5}"),
        ("otimes", "\u{2297}"),
        ("ouml", "\u{00F6}"),
        ("para", "\u{00B6}"),
        ("part", "\u{2202}"),
        ("permil", "\u{2030}"),
        ("perp", "\u{22A5}"),
        ("phi", "\u{03C6}"),
        ("pi", "\u{03C0}"),
        ("plusmn", "\u{00B1}"),
        ("pound", "\u{00A3}"),
        ("prime", "\u{2032}"),
        ("Prime", "\u{2033}"),
        ("prod", "\u{220F}"),
        ("prop", "\u{221D}"),
        ("psi", "\u{03C8}"),
        ("quot", "\""),
        ("radic", "\u{221A}"),
        ("rang", "\u{27E9}"),
        ("raquo", "\u{00BB}"),
        ("rarr", "\u{2192}"),
        ("rceil", "\u{2309}"),
        ("rdquo", "\u{201D}"),
        ("reg", "\u{00AE}"),
        ("rfloor", "\u{230B}"),
        ("rho", "\u{03C1}"),
        ("rlm", "\u{200F}"),
        ("rsaquo", "\u{203A}"),
        ("rsquo", "\u{2019}"),
        ("sbquo", "\u{201A}"),
        ("scaron", "\u{0161}"),
        ("sdot", "\u{22C5}"),
        ("sect", "\u{00A7}"),
        ("shy", "\u{00AD}"),
        ("sigma", "\u{03C3}"),
        ("sigmaf", "\u{03C2}"),
        ("sim", "\u{223C}"),
        ("spades", "\u{2660}"),
        ("sub", "\u{2282}"),
        ("sube", "\u{2286}"),
        ("sum", "\u{2211}"),
        ("sup", "\u{2283}"),
        ("sup1", "\u{00B9}"),
        ("sup2", "\u{00B2}"),
        ("sup3", "\u{00B3}"),
        ("supe", "\u{2287}"),
        ("szlig", "\u{00DF}"),
        ("tau", "\u{03C4}"),
        ("there4", "\u{2234}"),
        ("theta", "\u{03B8}"),
        ("thinsp", "\u{2009}"),
        ("thorn", "\u{00FE}"),
        ("tilde", "\u{02DC}"),
        ("times", "\u{00D7}"),
        ("trade", "\u{2122}"),
        ("uacute", "\u{00FA}"),
        ("uarr", "\u{2191}"),
        ("ucirc", "\u{00FB}"),
        ("ugrave", "\u{00F9}"),
        ("uml", "\u{00A8}"),
        ("upsilon", "\u{03C5}"),
        ("uuml", "\u{00FC}"),
        ("xi", "\u{03BE}"),
        ("yacute", "\u{00FD}"),
        ("yen", "\u{00A5}"),
        ("yuml", "\u{00FF}"),
        ("zeta", "\u{03B6}"),
        ("zwj", "\u{200D}"),
        ("zwnj", "\u{200C}"),
    ];
    pairs.iter().copied().collect()
});

pub(crate) fn lookup_named_entity(name: &str) -> Option<&'static str> {
    NAMED_ENTITIES.get(name).copied()
}

/// Decodes a character reference starting at `bytes[start]` (which must be
/// `&`). Returns the decoded UTF-8 bytes and the index one past the `;`.
/// Unknown names and malformed references return `None`; the caller keeps
/// the raw text.
pub(crate) fn decode_entity(bytes: &[u8], start: usize, end: usize) -> Option<(Vec<u8>, usize)> {
    if start + 2 >= end {
        return None;
    }
    if bytes[start] != b'&' {
        return None;
    }
    let mut i = start + 1;
    if bytes[i] == b'#' {
        i += 1;
        let mut radix = 10;
        if i < end && (bytes[i] == b'x' || bytes[i] == b'X') {
            radix = 16;
            i += 1;
        }
        let num_start = i;
        while i < end && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        if i == num_start || i >= end || bytes[i] != b';' {
            return None;
        }
        let number_str = std::str::from_utf8(&bytes[num_start..i]).ok()?;
        // CommonMark digit caps: 7 decimal / 6 hex digits at most.
        let max_digits = if radix == 16 { 6 } else { 7 };
        if number_str.len() > max_digits {
            return None;
        }
        let value = u32::from_str_radix(number_str, radix).ok()?;
        // NUL, surrogates and out-of-range codepoints decode to U+FFFD.
        let ch = if value == 0 || (0xD800..=0xDFFF).contains(&value) || value > 0x10FFFF {
            '\u{FFFD}'
        } else {
            std::char::from_u32(value).unwrap_or('\u{FFFD}')
        };
        let mut out = [0u8; 4];
        let encoded = ch.encode_utf8(&mut out);
        return Some((encoded.as_bytes().to_vec(), i + 1));
    }
    let name_start = i;
    while i < end && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start || i >= end || bytes[i] != b';' {
        return None;
    }
    let name = std::str::from_utf8(&bytes[name_start..i]).ok()?;
    let decoded = lookup_named_entity(name)?;
    Some((decoded.as_bytes().to_vec(), i + 1))
}

#[cfg(test)]
mod tests {
    use super::decode_entity;

    fn decode(input: &str) -> Option<(String, usize)> {
        decode_entity(input.as_bytes(), 0, input.len())
            .map(|(bytes, next)| (String::from_utf8(bytes).unwrap(), next))
    }

    #[test]
    fn named_references_decode() {
        assert_eq!(decode("&amp;"), Some(("&".to_string(), 5)));
        assert_eq!(decode("&copy; rest"), Some(("\u{00A9}".to_string(), 6)));
        assert_eq!(decode("&nosuchentity;"), None);
    }

    #[test]
    fn numeric_references_decode() {
        assert_eq!(decode("&#65;"), Some(("A".to_string(), 5)));
        assert_eq!(decode("&#x41;"), Some(("A".to_string(), 6)));
        assert_eq!(decode("&#0;"), Some(("\u{FFFD}".to_string(), 4)));
        assert_eq!(decode("&#12345678;"), None);
    }
}
