/// CLIR suppression/invocation prefixes, after which a '+' is still accepted
const CLIR_ON: &str = "*31#";
const CLIR_OFF: &str = "#31#";

/// Dialable characters other than digits. 'N' is the wild character.
#[inline]
fn is_dialable_non_digit(c: char) -> bool {
    matches!(c, '*' | '#' | '+' | 'N')
}

/// ',' is a pause, ';' a wait. Either one starts the post-dial string.
#[inline]
fn starts_post_dial(c: char) -> bool {
    matches!(c, ',' | ';')
}

/// Strips a dial string down to the part that is sent to the network.
///
/// Digits and the dialable characters `*`, `#`, `N` are kept. A `+` is only
/// kept in leading position, or right after a CLIR prefix. The first pause or
/// wait character ends the network portion. Everything else is dropped.
pub fn extract_network_portion(input: &str) -> String {
    let mut ret = String::with_capacity(input.len());

    for c in input.chars() {
        if c.is_ascii_digit() {
            ret.push(c);
        } else if c == '+' {
            if ret.is_empty() || ret == CLIR_ON || ret == CLIR_OFF {
                ret.push(c);
            }
        } else if is_dialable_non_digit(c) {
            ret.push(c);
        } else if starts_post_dial(c) {
            break;
        }
    }
    ret
}

/// GPRS context activation strings (`*99...#`) are accepted by the dial
/// command without creating a voice call
pub fn is_gprs_dial_string(number: &str) -> bool {
    number.starts_with("*99") && number.ends_with('#')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_strips_formatting() {
        assert_eq!(extract_network_portion("(650) 555-1212"), "6505551212");
        assert_eq!(extract_network_portion("+1 650 555 1212"), "+16505551212");
        assert_eq!(extract_network_portion("abc"), "");
    }

    #[test]
    fn test_plus_position() {
        assert_eq!(extract_network_portion("1+2"), "12");
        assert_eq!(extract_network_portion("*31#+1234"), "*31#+1234");
        assert_eq!(extract_network_portion("#31#+1234"), "#31#+1234");
        assert_eq!(extract_network_portion("*30#+1234"), "*30#1234");
    }

    #[test]
    fn test_post_dial_cut() {
        assert_eq!(extract_network_portion("5551212,1234"), "5551212");
        assert_eq!(extract_network_portion("5551212;1234"), "5551212");
        assert_eq!(extract_network_portion("N5551212"), "N5551212");
    }

    #[test]
    fn test_gprs() {
        assert!(is_gprs_dial_string("*99***1#"));
        assert!(!is_gprs_dial_string("*991"));
        assert!(!is_gprs_dial_string("5551212"));
    }
}
