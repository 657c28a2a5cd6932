//! Texture slots of the built-in material families.

use crate::assets::TextureHandle;

/// A texture slot a built-in material can fill.
///
/// The discriminant is the bit index in [`MapSet`] and the order the slots
/// are declared in generated programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MapSlot {
    Map = 0,
    AlphaMap,
    AoMap,
    LightMap,
    EmissiveMap,
    BumpMap,
    NormalMap,
    DisplacementMap,
    RoughnessMap,
    MetalnessMap,
    SpecularMap,
    EnvMap,
    GradientMap,
    Matcap,
    ClearcoatMap,
    ClearcoatRoughnessMap,
    SheenColorMap,
    IridescenceMap,
    TransmissionMap,
    ThicknessMap,
    AnisotropyMap,
}

impl MapSlot {
    pub const COUNT: usize = 21;

    pub const ALL: [MapSlot; Self::COUNT] = [
        Self::Map,
        Self::AlphaMap,
        Self::AoMap,
        Self::LightMap,
        Self::EmissiveMap,
        Self::BumpMap,
        Self::NormalMap,
        Self::DisplacementMap,
        Self::RoughnessMap,
        Self::MetalnessMap,
        Self::SpecularMap,
        Self::EnvMap,
        Self::GradientMap,
        Self::Matcap,
        Self::ClearcoatMap,
        Self::ClearcoatRoughnessMap,
        Self::SheenColorMap,
        Self::IridescenceMap,
        Self::TransmissionMap,
        Self::ThicknessMap,
        Self::AnisotropyMap,
    ];

    /// Binding name in generated programs.
    #[must_use]
    pub fn uniform_name(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::AlphaMap => "alpha_map",
            Self::AoMap => "ao_map",
            Self::LightMap => "light_map",
            Self::EmissiveMap => "emissive_map",
            Self::BumpMap => "bump_map",
            Self::NormalMap => "normal_map",
            Self::DisplacementMap => "displacement_map",
            Self::RoughnessMap => "roughness_map",
            Self::MetalnessMap => "metalness_map",
            Self::SpecularMap => "specular_map",
            Self::EnvMap => "env_map",
            Self::GradientMap => "gradient_map",
            Self::Matcap => "matcap",
            Self::ClearcoatMap => "clearcoat_map",
            Self::ClearcoatRoughnessMap => "clearcoat_roughness_map",
            Self::SheenColorMap => "sheen_color_map",
            Self::IridescenceMap => "iridescence_map",
            Self::TransmissionMap => "transmission_map",
            Self::ThicknessMap => "thickness_map",
            Self::AnisotropyMap => "anisotropy_map",
        }
    }

    #[must_use]
    pub fn is_cube(self) -> bool {
        matches!(self, Self::EnvMap)
    }

    /// Whether the slot is sampled in the vertex stage.
    #[must_use]
    pub fn is_vertex_stage(self) -> bool {
        matches!(self, Self::DisplacementMap)
    }

    #[inline]
    fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

/// Presence bitset over [`MapSlot`], part of program keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MapSet(u32);

impl MapSet {
    #[must_use]
    pub fn contains(self, slot: MapSlot) -> bool {
        self.0 & slot.bit() != 0
    }

    pub fn insert(&mut self, slot: MapSlot) {
        self.0 |= slot.bit();
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & ((1 << MapSlot::COUNT) - 1))
    }

    #[must_use]
    pub fn intersection(self, other: MapSet) -> MapSet {
        MapSet(self.0 & other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = MapSlot> {
        MapSlot::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<MapSlot> for MapSet {
    fn from_iter<I: IntoIterator<Item = MapSlot>>(iter: I) -> Self {
        let mut set = MapSet::default();
        for slot in iter {
            set.insert(slot);
        }
        set
    }
}

/// Texture assignments of a material, one optional handle per slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialMaps {
    slots: [Option<TextureHandle>; MapSlot::COUNT],
}

impl MaterialMaps {
    #[must_use]
    pub fn get(&self, slot: MapSlot) -> Option<TextureHandle> {
        self.slots[slot as usize]
    }

    pub fn set(&mut self, slot: MapSlot, texture: Option<TextureHandle>) {
        self.slots[slot as usize] = texture;
    }

    /// Slots that hold a texture.
    #[must_use]
    pub fn present(&self) -> MapSet {
        MapSlot::ALL
            .into_iter()
            .filter(|s| self.slots[*s as usize].is_some())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MapSlot, TextureHandle)> + '_ {
        MapSlot::ALL
            .into_iter()
            .filter_map(|s| self.slots[s as usize].map(|t| (s, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_table_is_consistent() {
        for (idx, slot) in MapSlot::ALL.iter().enumerate() {
            assert_eq!(*slot as usize, idx);
        }
        let all: MapSet = MapSlot::ALL.into_iter().collect();
        assert_eq!(all.iter().count(), MapSlot::COUNT);
        assert_eq!(MapSet::from_bits(u32::MAX), all);
    }
}
