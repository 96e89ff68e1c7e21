//! Conversions between host pixels and the object protocol's distance units.

use axhost_domain::{Point, Size};
use serde::{Deserialize, Serialize};

pub const HIMETRIC_PER_INCH: i32 = 2540;
pub const TWIPS_PER_INCH: i32 = 1440;

/// Logical pixels per inch of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dpi {
    pub x: i32,
    pub y: i32,
}

impl Dpi {
    pub const DEFAULT: Dpi = Dpi { x: 96, y: 96 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn sanitized(self) -> Self {
        Self {
            x: if self.x > 0 { self.x } else { Self::DEFAULT.x },
            y: if self.y > 0 { self.y } else { Self::DEFAULT.y },
        }
    }

    pub fn size_to_himetric(self, size: Size) -> Size {
        let dpi = self.sanitized();
        Size::new(
            pixels_to_himetric(size.width, dpi.x),
            pixels_to_himetric(size.height, dpi.y),
        )
    }

    pub fn size_from_himetric(self, size: Size) -> Size {
        let dpi = self.sanitized();
        Size::new(
            himetric_to_pixels(size.width, dpi.x),
            himetric_to_pixels(size.height, dpi.y),
        )
    }

    pub fn point_to_himetric(self, point: Point) -> Point {
        let dpi = self.sanitized();
        Point {
            x: pixels_to_himetric(point.x, dpi.x),
            y: pixels_to_himetric(point.y, dpi.y),
        }
    }

    pub fn point_from_himetric(self, point: Point) -> Point {
        let dpi = self.sanitized();
        Point {
            x: himetric_to_pixels(point.x, dpi.x),
            y: himetric_to_pixels(point.y, dpi.y),
        }
    }

    pub fn x_to_twips(self, pixels: i32) -> i32 {
        pixels_to_twips(pixels, self.sanitized().x)
    }

    pub fn y_to_twips(self, pixels: i32) -> i32 {
        pixels_to_twips(pixels, self.sanitized().y)
    }

    pub fn x_from_twips(self, twips: i32) -> i32 {
        twips_to_pixels(twips, self.sanitized().x)
    }

    pub fn y_from_twips(self, twips: i32) -> i32 {
        twips_to_pixels(twips, self.sanitized().y)
    }
}

impl Default for Dpi {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Rounded to nearest, matching MulDiv.
fn mul_div(value: i32, numerator: i32, denominator: i32) -> i32 {
    let product = i64::from(value) * i64::from(numerator);
    let denominator = i64::from(denominator);
    let half = denominator / 2;
    let rounded = if product >= 0 {
        (product + half) / denominator
    } else {
        (product - half) / denominator
    };
    rounded.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

pub fn pixels_to_himetric(pixels: i32, logical_pixels: i32) -> i32 {
    mul_div(pixels, HIMETRIC_PER_INCH, logical_pixels)
}

pub fn himetric_to_pixels(himetric: i32, logical_pixels: i32) -> i32 {
    mul_div(himetric, logical_pixels, HIMETRIC_PER_INCH)
}

pub fn pixels_to_twips(pixels: i32, logical_pixels: i32) -> i32 {
    ((f64::from(pixels) / f64::from(logical_pixels)) * f64::from(TWIPS_PER_INCH)) as i32
}

pub fn twips_to_pixels(twips: i32, logical_pixels: i32) -> i32 {
    ((f64::from(twips) / f64::from(TWIPS_PER_INCH)) * f64::from(logical_pixels)) as i32
}

/// Direction of a site coordinate transform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    HimetricToContainer,
    ContainerToHimetric,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn himetric_round_trips_at_common_dpi() {
        for dpi in [Dpi::new(96, 96), Dpi::new(120, 120), Dpi::new(144, 192)] {
            let size = Size::new(75, 23);
            let back = dpi.size_from_himetric(dpi.size_to_himetric(size));
            assert_eq!(back, size, "dpi {dpi:?}");
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(pixels_to_himetric(96, 96), 2540);
        assert_eq!(himetric_to_pixels(2540, 96), 96);
        assert_eq!(pixels_to_twips(96, 96), 1440);
        assert_eq!(twips_to_pixels(1440, 120), 120);
        assert_eq!(pixels_to_himetric(-10, 96), -265);
    }

    #[test]
    fn zero_dpi_falls_back_to_default() {
        let dpi = Dpi::new(0, -5);
        assert_eq!(dpi.size_to_himetric(Size::new(96, 96)), Size::new(2540, 2540));
    }
}
