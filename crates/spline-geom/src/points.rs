use serde::{Deserialize, Serialize};

use crate::error::GeomError;

/// The shape of one control point: how many spatial coordinates it carries
/// and whether a weight channel precedes them.
///
/// Rational points are stored homogeneously: channel 0 holds the weight `w`
/// and the coordinate channels hold `w * x`. Evaluating a rational
/// representation therefore evaluates every channel with the same basis blend
/// and divides by the evaluated weight at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointType {
    coords: usize,
    rational: bool,
}

impl PointType {
    pub fn new(coords: usize, rational: bool) -> Self {
        Self { coords, rational }
    }

    pub fn coords(&self) -> usize {
        self.coords
    }

    pub fn is_rational(&self) -> bool {
        self.rational
    }

    /// Number of scalar channels per point (coords plus the weight channel).
    pub fn channels(&self) -> usize {
        self.coords + usize::from(self.rational)
    }

    /// Smallest point type both operands can be coerced into.
    pub fn common(a: PointType, b: PointType) -> PointType {
        PointType {
            coords: a.coords.max(b.coords),
            rational: a.rational || b.rational,
        }
    }

    /// True when every point of this type is representable in `other`.
    pub fn fits_in(&self, other: PointType) -> bool {
        self.coords <= other.coords && (!self.rational || other.rational)
    }
}

/// A block of control points stored channel-major.
///
/// Channel-major layout keeps each scalar channel contiguous, which is what
/// the refinement and subdivision kernels want: they sweep one channel at a
/// time with strided reads and never touch the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtlPoints {
    ptype: PointType,
    len: usize,
    channels: Vec<Vec<f64>>,
}

impl CtlPoints {
    /// All-zero block of `len` points.
    pub fn zeros(ptype: PointType, len: usize) -> Self {
        Self {
            ptype,
            len,
            channels: vec![vec![0.0; len]; ptype.channels()],
        }
    }

    /// Build from per-channel data; all channels must share a length and
    /// their count must match the point type.
    pub fn from_channels(ptype: PointType, channels: Vec<Vec<f64>>) -> Result<Self, GeomError> {
        if channels.len() != ptype.channels() {
            return Err(GeomError::PointTypeMismatch(format!(
                "{} channels supplied for a {}-channel point type",
                channels.len(),
                ptype.channels()
            )));
        }
        let len = channels.first().map_or(0, |c| c.len());
        if let Some(bad) = channels.iter().find(|c| c.len() != len) {
            return Err(GeomError::MeshSizeMismatch {
                expected: len,
                found: bad.len(),
            });
        }
        Ok(Self {
            ptype,
            len,
            channels,
        })
    }

    pub fn point_type(&self) -> PointType {
        self.ptype
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw channel `c` (weight first when rational).
    pub fn raw_channel(&self, c: usize) -> &[f64] {
        &self.channels[c]
    }

    pub fn raw_channel_mut(&mut self, c: usize) -> &mut [f64] {
        &mut self.channels[c]
    }

    /// Channel holding spatial coordinate `c`, skipping the weight channel.
    pub fn coord_channel(&self, c: usize) -> &[f64] {
        &self.channels[c + usize::from(self.ptype.rational)]
    }

    /// The weight channel, when rational.
    pub fn weights(&self) -> Option<&[f64]> {
        self.ptype.rational.then(|| self.channels[0].as_slice())
    }

    /// Euclidean coordinates of point `i`, dividing out the weight when
    /// rational.
    pub fn euclidean(&self, i: usize) -> Vec<f64> {
        if self.ptype.rational {
            let w = self.channels[0][i];
            self.channels[1..].iter().map(|ch| ch[i] / w).collect()
        } else {
            self.channels.iter().map(|ch| ch[i]).collect()
        }
    }

    /// Re-express the block in a wider point type.
    ///
    /// Added coordinate channels are zero; a newly added weight channel is
    /// all ones (with weight one the homogeneous coordinates equal the
    /// original ones). Narrowing is an error.
    pub fn coerce(&self, to: PointType) -> Result<CtlPoints, GeomError> {
        if !self.ptype.fits_in(to) {
            return Err(GeomError::PointTypeMismatch(format!(
                "cannot narrow {:?} to {:?}",
                self.ptype, to
            )));
        }
        if self.ptype == to {
            return Ok(self.clone());
        }
        let mut channels = Vec::with_capacity(to.channels());
        if to.rational {
            if self.ptype.rational {
                channels.push(self.channels[0].clone());
            } else {
                channels.push(vec![1.0; self.len]);
            }
        }
        for c in 0..to.coords {
            if c < self.ptype.coords {
                channels.push(self.coord_channel(c).to_vec());
            } else {
                channels.push(vec![0.0; self.len]);
            }
        }
        Ok(Self {
            ptype: to,
            len: self.len,
            channels,
        })
    }
}
