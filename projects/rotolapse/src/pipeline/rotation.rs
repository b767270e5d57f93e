// Quarter-turn rotation through precomputed coordinate maps.

use crate::error::{Result, VideoError};
use crate::video::{Frame, FrameGeometry};
use ndarray::{s, Array2, Array3};

/// Source coordinates for every output pixel of a `90° × quadrants`
/// counter-clockwise rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMap {
    source: FrameGeometry,
    quadrants: u8,
    /// Source column per output pixel.
    xs: Array2<u32>,
    /// Source row per output pixel.
    ys: Array2<u32>,
}

impl RotationMap {
    /// Negative counts rotate clockwise; the count is taken modulo 4.
    pub fn build(source: FrameGeometry, quadrants: i32) -> Self {
        let quadrants = quadrants.rem_euclid(4) as u8;
        let (h, w) = (source.height as usize, source.width as usize);
        let xs = Array2::from_shape_fn((h, w), |(_, x)| x as u32);
        let ys = Array2::from_shape_fn((h, w), |(y, _)| y as u32);
        Self {
            source,
            quadrants,
            xs: rot90(&xs, quadrants),
            ys: rot90(&ys, quadrants),
        }
    }

    pub fn source_geometry(&self) -> FrameGeometry {
        self.source
    }

    pub fn output_geometry(&self) -> FrameGeometry {
        if self.quadrants % 2 == 1 {
            self.source.swapped()
        } else {
            self.source
        }
    }

    pub fn quadrants(&self) -> u8 {
        self.quadrants
    }

    /// Nearest-neighbour remap; the frame must match the geometry the map was
    /// built for.
    pub fn apply(&self, frame: &Frame) -> Result<Frame> {
        if frame.geometry() != self.source {
            return Err(VideoError::InvalidGeometry(format!(
                "rotation map built for {}, got {}",
                self.source,
                frame.geometry()
            )));
        }
        if self.quadrants == 0 {
            return Ok(frame.clone());
        }
        let pixels = frame.pixels();
        let rotated = Array3::from_shape_fn(self.output_geometry().shape(), |(y, x, c)| {
            let sx = self.xs[[y, x]] as usize;
            let sy = self.ys[[y, x]] as usize;
            pixels[[sy, sx, c]]
        });
        Ok(Frame::new(rotated))
    }
}

fn rot90(grid: &Array2<u32>, quadrants: u8) -> Array2<u32> {
    match quadrants {
        1 => grid.t().slice(s![..;-1, ..]).to_owned(),
        2 => grid.slice(s![..;-1, ..;-1]).to_owned(),
        3 => grid.t().slice(s![.., ..;-1]).to_owned(),
        _ => grid.clone(),
    }
}

/// Rotates frames, rebuilding its map only when the frame geometry or the
/// quadrant count changes.
#[derive(Debug, Clone)]
pub struct RotationMapper {
    quadrants: i32,
    map: Option<RotationMap>,
}

impl RotationMapper {
    pub fn new(quadrants: i32) -> Self {
        Self {
            quadrants,
            map: None,
        }
    }

    pub fn set_quadrants(&mut self, quadrants: i32) {
        self.quadrants = quadrants;
    }

    pub fn is_identity(&self) -> bool {
        self.quadrants.rem_euclid(4) == 0
    }

    /// `(90 × quadrants) mod 360`, counter-clockwise.
    pub fn angle_degrees(&self) -> u32 {
        self.quadrants.rem_euclid(4) as u32 * 90
    }

    pub fn output_geometry(&self, source: FrameGeometry) -> FrameGeometry {
        if self.quadrants.rem_euclid(2) == 1 {
            source.swapped()
        } else {
            source
        }
    }

    pub fn map_for(&mut self, source: FrameGeometry) -> &RotationMap {
        let wanted = self.quadrants.rem_euclid(4) as u8;
        let stale = !matches!(
            &self.map,
            Some(map) if map.source == source && map.quadrants == wanted
        );
        if stale {
            tracing::debug!(
                "RotationMapper: building {}° map for {}",
                self.angle_degrees(),
                source
            );
            self.map = None;
        }
        let quadrants = self.quadrants;
        self.map
            .get_or_insert_with(|| RotationMap::build(source, quadrants))
    }

    pub fn rotate(&mut self, frame: &Frame) -> Result<Frame> {
        if self.is_identity() {
            return Ok(frame.clone());
        }
        self.map_for(frame.geometry()).apply(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32, channels: u32) -> Frame {
        let geometry = FrameGeometry::new(width, height, channels);
        let data = (0..geometry.byte_len()).map(|i| (i % 256) as u8).collect();
        Frame::from_raw(geometry, data).unwrap()
    }

    #[test]
    fn test_full_turns_are_identity() {
        let frame = numbered(7, 5, 3);
        for quadrants in [0, 4, -4, 8] {
            let map = RotationMap::build(frame.geometry(), quadrants);
            assert_eq!(map.apply(&frame).unwrap(), frame, "quadrants {}", quadrants);
        }
    }

    #[test]
    fn test_quarter_turn_swaps_dimensions() {
        let frame = Frame::zeros(FrameGeometry::new(640, 360, 3));
        for quadrants in [1, 3, -1] {
            let rotated = RotationMap::build(frame.geometry(), quadrants).apply(&frame).unwrap();
            assert_eq!(rotated.geometry(), FrameGeometry::new(360, 640, 3));
        }
        let half = RotationMap::build(frame.geometry(), 2).apply(&frame).unwrap();
        assert_eq!(half.geometry(), frame.geometry());
    }

    #[test]
    fn test_counter_clockwise_layout() {
        // 2x3 single channel:
        //   1 2 3
        //   4 5 6
        let frame = Frame::from_raw(FrameGeometry::new(3, 2, 1), vec![1, 2, 3, 4, 5, 6]).unwrap();

        let ccw = RotationMap::build(frame.geometry(), 1).apply(&frame).unwrap();
        assert_eq!(ccw.to_bytes(), vec![3, 6, 2, 5, 1, 4]);

        let half = RotationMap::build(frame.geometry(), 2).apply(&frame).unwrap();
        assert_eq!(half.to_bytes(), vec![6, 5, 4, 3, 2, 1]);

        let cw = RotationMap::build(frame.geometry(), 3).apply(&frame).unwrap();
        assert_eq!(cw.to_bytes(), vec![4, 1, 5, 2, 6, 3]);
        assert_eq!(RotationMap::build(frame.geometry(), -1).apply(&frame).unwrap(), cw);
    }

    #[test]
    fn test_channels_stay_together() {
        let frame = numbered(4, 3, 3);
        let rotated = RotationMap::build(frame.geometry(), 1).apply(&frame).unwrap();
        // Output (0, 0) comes from source row 0, last column
        let src = frame.pixels();
        let out = rotated.pixels();
        for c in 0..3 {
            assert_eq!(out[[0, 0, c]], src[[0, 3, c]]);
        }
    }

    #[test]
    fn test_four_quarter_turns_round_trip() {
        let frame = numbered(5, 3, 3);
        let mut mapper = RotationMapper::new(1);
        let mut current = frame.clone();
        for _ in 0..4 {
            current = mapper.rotate(&current).unwrap();
        }
        assert_eq!(current, frame);
    }

    #[test]
    fn test_apply_rejects_other_geometry() {
        let map = RotationMap::build(FrameGeometry::new(4, 4, 3), 1);
        assert!(matches!(
            map.apply(&Frame::zeros(FrameGeometry::new(4, 4, 1))),
            Err(VideoError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_mapper_caches_until_inputs_change() {
        let mut mapper = RotationMapper::new(3);
        assert_eq!(mapper.angle_degrees(), 270);
        let geometry = FrameGeometry::new(8, 4, 3);

        let first = mapper.map_for(geometry) as *const RotationMap;
        let again = mapper.map_for(geometry) as *const RotationMap;
        assert_eq!(first, again);
        assert_eq!(mapper.map_for(geometry).quadrants(), 3);

        mapper.set_quadrants(-2);
        assert_eq!(mapper.angle_degrees(), 180);
        assert_eq!(mapper.map_for(geometry).quadrants(), 2);
        assert_eq!(mapper.output_geometry(geometry), geometry);

        let other = FrameGeometry::new(6, 6, 3);
        assert_eq!(mapper.map_for(other).source_geometry(), other);
    }
}
