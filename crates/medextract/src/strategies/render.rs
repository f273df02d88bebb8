//! Pixel transforms applied before encoding

use crate::codec::{tags, Record};
use crate::error::ItemError;

/// Apply the record's rescale slope and intercept, if any
pub fn rescale(data: &mut [f32], record: &Record) -> Result<(), ItemError> {
    let slope = record.find_number(tags::RESCALE_SLOPE)?.unwrap_or(1.0) as f32;
    let intercept = record.find_number(tags::RESCALE_INTERCEPT)?.unwrap_or(0.0) as f32;
    if slope != 1.0 || intercept != 0.0 {
        for value in data.iter_mut() {
            *value = *value * slope + intercept;
        }
    }
    Ok(())
}

/// Window bounds `[c - w/2, c + w/2]` from the first centre/width present,
/// searching nested groups too. `None` when either is absent.
pub fn window_bounds(record: &Record) -> Result<Option<(f32, f32)>, ItemError> {
    let center = record.find_number(tags::WINDOW_CENTER)?;
    let width = record.find_number(tags::WINDOW_WIDTH)?;
    match (center, width) {
        (Some(_), Some(width)) if width <= 0.0 => Err(ItemError::conversion(
            "WindowWidth",
            format!("must be positive, found {}", width),
        )),
        (Some(center), Some(width)) => Ok(Some((
            (center - width / 2.0) as f32,
            (center + width / 2.0) as f32,
        ))),
        _ => Ok(None),
    }
}

pub fn clamp(data: &mut [f32], (low, high): (f32, f32)) {
    for value in data.iter_mut() {
        *value = value.clamp(low, high);
    }
}

/// Scale to the full 16-bit range: `max(x, 0) / max * 65535`
///
/// All-zero (or all-negative) input stays zero.
pub fn scale_to_u16(data: &[f32]) -> Vec<u16> {
    let max = data.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return vec![0; data.len()];
    }
    data.iter()
        .map(|&v| (v.max(0.0) / max * f32::from(u16::MAX)) as u16)
        .collect()
}

/// Clamp colour samples into 8 bits
pub fn to_rgb8(data: &[f32]) -> Vec<u16> {
    data.iter().map(|&v| v.clamp(0.0, 255.0) as u16).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Laterality {
    Left,
    Right,
}

impl Laterality {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "L" => Some(Laterality::Left),
            "R" => Some(Laterality::Right),
            _ => None,
        }
    }
}

/// Side of the body from where the tissue sits in the frame: tissue on the
/// right edge means a right breast imaged from the standard view.
pub fn estimate_laterality(data: &[f32], columns: usize) -> Laterality {
    let (mut left, mut right) = (0.0f64, 0.0f64);
    if columns == 0 {
        return Laterality::Left;
    }
    for row in data.chunks_exact(columns) {
        left += f64::from(row[0]);
        right += f64::from(row[columns - 1]);
    }
    if left < right {
        Laterality::Right
    } else {
        Laterality::Left
    }
}

/// Mirror every row of every frame
pub fn flip_horizontal(data: &mut [f32], columns: usize) {
    if columns == 0 {
        return;
    }
    for row in data.chunks_mut(columns) {
        row.reverse();
    }
}
