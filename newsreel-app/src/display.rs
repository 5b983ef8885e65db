//! Terminal rendering for the play loop

const BARS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Collapse frequency bytes into `width` block-character bars
pub fn spectrum_bars(data: &[u8], width: usize) -> String {
    if data.is_empty() || width == 0 {
        return " ".repeat(width);
    }

    let per_bar = data.len().div_ceil(width).max(1);
    let mut out: String = data
        .chunks(per_bar)
        .map(|chunk| {
            let peak = chunk.iter().copied().max().unwrap_or(0) as usize;
            BARS[peak * (BARS.len() - 1) / 255]
        })
        .collect();

    let drawn = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(drawn)));
    out
}

/// `m:ss` for a playback position
pub fn format_position(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// One status line: position, spectrum, and the word being spoken
pub fn status_line(position: f64, data: &[u8], word: Option<&str>) -> String {
    format!(
        "{:>6} |{}| {}",
        format_position(position),
        spectrum_bars(data, 32),
        word.unwrap_or("")
    )
}
