//! Text box measurement.

use crate::element::TextStyle;

/// Average glyph advance as a fraction of the font size.
const AVERAGE_GLYPH_EM: f32 = 0.5;

/// Result of laying out a text box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Number of wrapped lines.
    pub lines: usize,
    /// Box height.
    pub height: f32,
}

/// Computes how tall a text box of a given width is.
pub trait TextMeasurer: Send + Sync {
    /// Measure `style.content` wrapped to `max_width`.
    fn measure(&self, style: &TextStyle, max_width: f32) -> TextMetrics;
}

/// Greedy word wrap with a fixed average glyph width.
///
/// Deterministic and font-free: good enough for layout and round trips,
/// not for pixel-exact typesetting.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTextMeasurer;

impl HeuristicTextMeasurer {
    fn glyph_width(style: &TextStyle) -> f32 {
        style.font_size * AVERAGE_GLYPH_EM + style.char_spacing / 1000.0 * style.font_size
    }
}

impl TextMeasurer for HeuristicTextMeasurer {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn measure(&self, style: &TextStyle, max_width: f32) -> TextMetrics {
        let glyph = Self::glyph_width(style).max(f32::EPSILON);
        let max_width = max_width.max(glyph);

        let mut lines = 0usize;
        for paragraph in style.content.split('\n') {
            let mut line_width = 0.0f32;
            let mut paragraph_lines = 1usize;
            for word in paragraph.split_whitespace() {
                let word_width = word.chars().count() as f32 * glyph;
                if word_width > max_width {
                    // A word wider than the box breaks across lines.
                    if line_width > 0.0 {
                        paragraph_lines += 1;
                    }
                    let spill = (word_width / max_width).ceil() as usize;
                    paragraph_lines += spill - 1;
                    line_width = word_width - (spill - 1) as f32 * max_width;
                    continue;
                }
                let needed = if line_width > 0.0 {
                    line_width + glyph + word_width
                } else {
                    word_width
                };
                if needed > max_width {
                    paragraph_lines += 1;
                    line_width = word_width;
                } else {
                    line_width = needed;
                }
            }
            lines += paragraph_lines;
        }

        let lines = lines.max(1);
        TextMetrics {
            lines,
            height: lines as f32 * style.font_size * style.line_height,
        }
    }
}
