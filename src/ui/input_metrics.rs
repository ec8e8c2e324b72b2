use unicode_width::UnicodeWidthChar;

pub fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_display_width).sum()
}

/// Longest prefix of `text` that fits in `max_width` columns.
pub fn truncate_to_display_width(text: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > max_width {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out
}

/// Fits `text` into `max_width` columns, ending with "..." when cut.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_string();
    }
    if max_width < 4 {
        return truncate_to_display_width(text, max_width);
    }
    let mut out = truncate_to_display_width(text, max_width - 3);
    out.push_str("...");
    out
}

/// Pads with spaces up to `width` columns. Longer text is left alone.
pub fn pad_to_width(text: &str, width: usize) -> String {
    let used = display_width(text);
    if used >= width {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + width - used);
    out.push_str(text);
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

/// Soft-wraps one line at spaces to `width` columns. Words wider than the
/// line are broken by character.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 || display_width(line) <= width {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for (idx, word) in line.split(' ').enumerate() {
        let word_width = display_width(word);

        if word_width > width {
            if current_width > 0 {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            for ch in word.chars() {
                let ch_width = char_display_width(ch);
                if current_width + ch_width > width && current_width > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(ch);
                current_width += ch_width;
            }
            continue;
        }

        // Leading spaces survive; spaces at a wrap point are dropped.
        let separator = usize::from(idx > 0);
        if current_width > 0 && current_width + separator + word_width > width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        } else {
            if separator == 1 {
                current.push(' ');
            }
            current.push_str(word);
            current_width += separator + word_width;
        }
    }

    if current_width > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps every line of `text`, keeping existing line breaks.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    text.split('\n')
        .flat_map(|line| wrap_line(line.strip_suffix('\r').unwrap_or(line), width))
        .collect()
}
