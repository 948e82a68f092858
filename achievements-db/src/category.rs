//! Statistic categories.
//!
//! Each category is backed by its own table, `<prefix><db name>`, whose amount
//! column carries the same name. These enumerations are the only source of
//! identifiers concatenated into SQL text.

/// Categories tracked with a single amount per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalCategory {
    Connections,
    Deaths,
    Arrows,
    Snowballs,
    Eggs,
    Fish,
    Treasures,
    ItemBreaks,
    EatenItems,
    Shears,
    Milks,
    LavaBuckets,
    WaterBuckets,
    Trades,
    AnvilsUsed,
    Enchantments,
    Beds,
    MaxLevel,
    ConsumedPotions,
    PlayedTime,
    DistanceFoot,
    DistancePig,
    DistanceHorse,
    DistanceMinecart,
    DistanceBoat,
    DistanceGliding,
    DistanceLlama,
    ItemDrops,
    ItemPickups,
    HoePlowing,
    Fertilising,
    Fireworks,
    MusicDiscs,
    EnderPearls,
    PetMasterGive,
    PetMasterReceive,
    Smelting,
    AdvancementsCompleted,
    Riptides,
}

impl NormalCategory {
    pub const ALL: [NormalCategory; 39] = [
        Self::Connections,
        Self::Deaths,
        Self::Arrows,
        Self::Snowballs,
        Self::Eggs,
        Self::Fish,
        Self::Treasures,
        Self::ItemBreaks,
        Self::EatenItems,
        Self::Shears,
        Self::Milks,
        Self::LavaBuckets,
        Self::WaterBuckets,
        Self::Trades,
        Self::AnvilsUsed,
        Self::Enchantments,
        Self::Beds,
        Self::MaxLevel,
        Self::ConsumedPotions,
        Self::PlayedTime,
        Self::DistanceFoot,
        Self::DistancePig,
        Self::DistanceHorse,
        Self::DistanceMinecart,
        Self::DistanceBoat,
        Self::DistanceGliding,
        Self::DistanceLlama,
        Self::ItemDrops,
        Self::ItemPickups,
        Self::HoePlowing,
        Self::Fertilising,
        Self::Fireworks,
        Self::MusicDiscs,
        Self::EnderPearls,
        Self::PetMasterGive,
        Self::PetMasterReceive,
        Self::Smelting,
        Self::AdvancementsCompleted,
        Self::Riptides,
    ];

    /// Physical table and amount column name (before prefixing).
    pub fn db_name(self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Deaths => "deaths",
            Self::Arrows => "arrows",
            Self::Snowballs => "snowballs",
            Self::Eggs => "eggs",
            Self::Fish => "fish",
            Self::Treasures => "treasures",
            Self::ItemBreaks => "itembreaks",
            Self::EatenItems => "eatenitems",
            Self::Shears => "shears",
            Self::Milks => "milks",
            Self::LavaBuckets => "lavabuckets",
            Self::WaterBuckets => "waterbuckets",
            Self::Trades => "trades",
            Self::AnvilsUsed => "anvilsused",
            Self::Enchantments => "enchantments",
            Self::Beds => "beds",
            Self::MaxLevel => "levels",
            Self::ConsumedPotions => "consumedpotions",
            Self::PlayedTime => "playedtime",
            Self::DistanceFoot => "distancefoot",
            Self::DistancePig => "distancepig",
            Self::DistanceHorse => "distancehorse",
            Self::DistanceMinecart => "distanceminecart",
            Self::DistanceBoat => "distanceboat",
            Self::DistanceGliding => "distancegliding",
            Self::DistanceLlama => "distancellama",
            Self::ItemDrops => "drops",
            Self::ItemPickups => "pickups",
            Self::HoePlowing => "hoeplowing",
            Self::Fertilising => "fertilising",
            Self::Fireworks => "fireworks",
            Self::MusicDiscs => "musicdiscs",
            Self::EnderPearls => "enderpearls",
            Self::PetMasterGive => "petmastergive",
            Self::PetMasterReceive => "petmasterreceive",
            Self::Smelting => "smelting",
            Self::AdvancementsCompleted => "advancementscompleted",
            Self::Riptides => "riptides",
        }
    }
}

/// Categories tracked per (player, subcategory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultipleCategory {
    Places,
    Breaks,
    Kills,
    Crafts,
    Breeding,
    PlayerCommands,
    Custom,
    TargetsShot,
    EffectsHeld,
    JobsReborn,
}

impl MultipleCategory {
    pub const ALL: [MultipleCategory; 10] = [
        Self::Places,
        Self::Breaks,
        Self::Kills,
        Self::Crafts,
        Self::Breeding,
        Self::PlayerCommands,
        Self::Custom,
        Self::TargetsShot,
        Self::EffectsHeld,
        Self::JobsReborn,
    ];

    pub fn db_name(self) -> &'static str {
        match self {
            Self::Places => "places",
            Self::Breaks => "breaks",
            Self::Kills => "kills",
            Self::Crafts => "crafts",
            Self::Breeding => "breeding",
            Self::PlayerCommands => "playercommands",
            Self::Custom => "custom",
            Self::TargetsShot => "targetsshot",
            Self::EffectsHeld => "effectsheld",
            Self::JobsReborn => "jobsreborn",
        }
    }

    /// Discriminator column; part of the table's primary key.
    pub fn subcategory_column(self) -> &'static str {
        match self {
            Self::Places | Self::Breaks => "blockid",
            Self::Kills | Self::Breeding => "mobname",
            Self::Crafts => "item",
            Self::PlayerCommands => "command",
            Self::Custom => "customname",
            Self::TargetsShot => "targetname",
            Self::EffectsHeld => "effect",
            Self::JobsReborn => "jobname",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_identifier(name: &str) -> bool {
        !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase())
    }

    #[test]
    fn test_table_names_are_unique_identifiers() {
        let mut seen = HashSet::new();
        for name in NormalCategory::ALL
            .iter()
            .map(|c| c.db_name())
            .chain(MultipleCategory::ALL.iter().map(|c| c.db_name()))
        {
            assert!(is_identifier(name), "{name} is not a plain identifier");
            assert!(seen.insert(name), "duplicate table name {name}");
            assert_ne!(name, "achievements");
        }
    }

    #[test]
    fn test_subcategory_columns_do_not_clash_with_amount() {
        for category in MultipleCategory::ALL {
            assert!(is_identifier(category.subcategory_column()));
            assert_ne!(category.subcategory_column(), category.db_name());
        }
    }
}
