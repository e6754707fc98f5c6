//! Cutline rasterization onto a pixel grid.

use crate::geotiff::GeoTransform;
use geo::{LineString, MultiPolygon};

/// Which pixels of a raster window lie inside a cutline.
///
/// A pixel is inside when its centre is. Rings of one polygon are combined
/// with the even-odd rule, so holes drop out; separate polygons are unioned.
#[derive(Debug, Clone)]
pub struct CutlineMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl CutlineMask {
    /// Rasterize `cutline` onto a `width` x `height` window.
    ///
    /// The cutline must be in the CRS of `transform`.
    pub fn rasterize(
        cutline: &MultiPolygon<f64>,
        transform: &GeoTransform,
        width: usize,
        height: usize,
    ) -> Self {
        let mut cells = vec![false; width * height];
        let mut crossings = Vec::new();

        for polygon in cutline {
            for row in 0..height {
                let (_, y) = transform.pixel_center(0, row as i64);

                crossings.clear();
                for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                    ring_crossings(ring, y, &mut crossings);
                }
                crossings.sort_by(|a, b| a.total_cmp(b));

                // Inside spans are [x0, x1), [x2, x3), ...
                for span in crossings.chunks_exact(2) {
                    let (start, _) = transform.world_to_pixel(span[0], y);
                    let (end, _) = transform.world_to_pixel(span[1], y);
                    let first = (start - 0.5).ceil().max(0.0) as usize;
                    let last = (end - 0.5).ceil().clamp(0.0, width as f64) as usize;
                    for col in first..last {
                        cells[row * width + col] = true;
                    }
                }
            }
        }

        Self {
            width,
            height,
            cells,
        }
    }

    /// True if the pixel at `(col, row)` is inside the cutline.
    pub fn contains(&self, col: usize, row: usize) -> bool {
        col < self.width && row < self.height && self.cells[row * self.width + col]
    }

    /// Number of pixels inside the cutline.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&inside| inside).count()
    }
}

/// X positions where the horizontal line at `y` crosses the edges of `ring`.
fn ring_crossings(ring: &LineString<f64>, y: f64, out: &mut Vec<f64>) {
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if (a.y > y) != (b.y > y) {
            out.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
        }
    }
}
