// Bootloader tools print whatever the environment holds; keep it out of the terminal's way.
const MAX_LOG_CHARS: usize = 512;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    // CSI: ends at a final byte in '@'..='~'.
    Csi,
    // OSC/DCS/etc: ends at BEL or ESC '\'.
    String,
    StringEsc,
}

pub fn sanitize_output(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut esc: Option<Escape> = None;
    let mut kept = 0usize;

    for c in input.chars() {
        if let Some(state) = esc {
            esc = match (state, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']' | 'P' | 'X' | '^' | '_') => Some(Escape::String),
                (Escape::Start, _) => None,
                (Escape::Csi, '@'..='~') => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::String, '\x07') => None,
                (Escape::String, '\x1b') => Some(Escape::StringEsc),
                (Escape::String, _) => Some(Escape::String),
                (Escape::StringEsc, '\\') => None,
                (Escape::StringEsc, _) => Some(Escape::String),
            };
            continue;
        }

        match c {
            '\x1b' => {
                esc = Some(Escape::Start);
                continue;
            }
            '\n' | '\r' | '\t' => out.push(' '),
            c if c.is_control() || is_bidi_control(c) => continue,
            c => out.push(c),
        }
        kept += 1;
        if kept >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out.trim().to_string()
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
