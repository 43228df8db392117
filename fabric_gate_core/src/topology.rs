use std::fmt;

// ---------------------------------------------------------------------
// Fixed-rank topology codecs for the compute fabric.
// ---------------------------------------------------------------------

/// Dimension count of the fabric torus (A..E axes).
pub const TOPOLOGY_DIMS: usize = 5;

/// Wire form of a geometry or start-coordinate vector as the resource
/// manager ships it: one u16 per dimension, dimension order fixed.
pub type RawTopology = [u16; TOPOLOGY_DIMS];

/// Per-dimension extent of a sub-block allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Shape(pub [u32; TOPOLOGY_DIMS]);

/// Per-dimension starting coordinate of a sub-block allocation within
/// its enclosing block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Corner(pub [u32; TOPOLOGY_DIMS]);

/// Widen a wire-form geometry vector. Pure; per-dimension values and
/// dimension order are preserved exactly.
pub fn decode_shape(raw: &RawTopology) -> Shape {
    let mut out = [0u32; TOPOLOGY_DIMS];
    for (dim, v) in raw.iter().enumerate() {
        out[dim] = u32::from(*v);
    }
    Shape(out)
}

/// Widen a wire-form start-coordinate vector.
pub fn decode_corner(raw: &RawTopology) -> Corner {
    let mut out = [0u32; TOPOLOGY_DIMS];
    for (dim, v) in raw.iter().enumerate() {
        out[dim] = u32::from(*v);
    }
    Corner(out)
}

/// Compact fixed-order location string: the per-dimension values
/// concatenated in dimension order (e.g. [0,1,2,3,4] -> "01234").
pub fn compact_location(coords: &[u32; TOPOLOGY_DIMS]) -> String {
    let mut s = String::with_capacity(TOPOLOGY_DIMS);
    for c in coords {
        s.push_str(&c.to_string());
    }
    s
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", compact_location(&self.0))
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", compact_location(&self.0))
    }
}
