//! Interactive display of decoded images.

use std::io::{BufRead, Write};

use super::PixelMatrix;
use crate::error::Result;

/// Shows an image to the user and blocks until they dismiss it.
pub trait Preview {
    fn show(&mut self, title: &str, matrix: &PixelMatrix) -> Result<()>;
}

const RAMP: &[u8] = b" .:-=+*#%@";

/// Renders a matrix as character art and waits for Enter.
pub struct TerminalPreview<R, W> {
    input: R,
    output: W,
    columns: u32,
}

impl<R: BufRead, W: Write> TerminalPreview<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            columns: 64,
        }
    }

    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns.max(1);
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Preview for TerminalPreview<R, W> {
    fn show(&mut self, title: &str, matrix: &PixelMatrix) -> Result<()> {
        writeln!(
            self.output,
            "[{title}] {}x{}, {} channel(s)",
            matrix.width, matrix.height, matrix.channels
        )?;

        for line in render(matrix, self.columns) {
            writeln!(self.output, "{line}")?;
        }

        write!(self.output, "Press Enter to continue...")?;
        self.output.flush()?;

        let mut buf = String::new();
        self.input.read_line(&mut buf)?;
        writeln!(self.output)?;
        Ok(())
    }
}

/// Downsamples `matrix` to at most `columns` characters per row.
/// Rows are sampled at twice the column step since cells are tall.
fn render(matrix: &PixelMatrix, columns: u32) -> Vec<String> {
    if matrix.width == 0 || matrix.height == 0 {
        return Vec::new();
    }

    let cols = columns.min(matrix.width);
    let step_x = matrix.width as f64 / cols as f64;
    let step_y = step_x * 2.0;
    let rows = ((matrix.height as f64 / step_y).ceil() as u32).max(1);

    (0..rows)
        .map(|row| {
            let y = ((row as f64 * step_y) as u32).min(matrix.height - 1);
            (0..cols)
                .map(|col| {
                    let x = ((col as f64 * step_x) as u32).min(matrix.width - 1);
                    let level = luminance(matrix.pixel(x, y)) as usize;
                    RAMP[level * (RAMP.len() - 1) / 255] as char
                })
                .collect()
        })
        .collect()
}

fn luminance(px: &[u8]) -> u8 {
    match px {
        [b, g, r, ..] => (0.114 * *b as f64 + 0.587 * *g as f64 + 0.299 * *r as f64).round() as u8,
        [v, ..] => *v,
        [] => 0,
    }
}
