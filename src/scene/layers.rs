/// 32 visibility layers; a camera renders a node when their masks overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers(u32);

impl Default for Layers {
    fn default() -> Self {
        Self(1)
    }
}

impl Layers {
    #[must_use]
    pub fn none() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn all() -> Self {
        Self(u32::MAX)
    }

    /// Only `layer` enabled.
    #[must_use]
    pub fn only(layer: u8) -> Self {
        Self(1 << (layer & 31))
    }

    pub fn set(&mut self, layer: u8) {
        self.0 = 1 << (layer & 31);
    }

    pub fn enable(&mut self, layer: u8) {
        self.0 |= 1 << (layer & 31);
    }

    pub fn disable(&mut self, layer: u8) {
        self.0 &= !(1 << (layer & 31));
    }

    #[must_use]
    pub fn is_enabled(&self, layer: u8) -> bool {
        self.0 & (1 << (layer & 31)) != 0
    }

    #[must_use]
    pub fn test(&self, other: Layers) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        self.0
    }
}
