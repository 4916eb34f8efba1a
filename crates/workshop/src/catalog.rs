//! Built-in catalogue of popular Workshop-enabled games
//!
//! Steam has no public endpoint that lists Workshop-enabled apps, so the game
//! picker works from this curated list, ordered by popularity.

use once_cell::sync::Lazy;

use crate::steam::models::{AppInfo, GameInfo};

/// Minimum trimmed query length for a search to run
pub const MIN_QUERY_LEN: usize = 2;

const GAMES: &[(u32, &str)] = &[
    (730, "Counter-Strike: Global Offensive"),
    (570, "Dota 2"),
    (440, "Team Fortress 2"),
    (4000, "Garry's Mod"),
    (252490, "Rust"),
    (304930, "Unturned"),
    (431960, "Wallpaper Engine"),
    (294100, "RimWorld"),
    (255710, "Cities: Skylines"),
    (108600, "Project Zomboid"),
    (211820, "Starbound"),
    (105600, "Terraria"),
    (72850, "The Elder Scrolls V: Skyrim"),
    (489830, "The Elder Scrolls V: Skyrim Special Edition"),
    (1085660, "Destiny 2"),
    (271590, "Grand Theft Auto V"),
    (346110, "ARK: Survival Evolved"),
    (322330, "Don't Starve Together"),
    (230410, "Warframe"),
    (582010, "Monster Hunter: World"),
    (1172470, "Apex Legends"),
    (359550, "Tom Clancy's Rainbow Six Siege"),
    (292030, "The Witcher 3: Wild Hunt"),
    (1174180, "Red Dead Redemption 2"),
    (413150, "Stardew Valley"),
    (367520, "Hollow Knight"),
    (381210, "Dead by Daylight"),
    (236430, "A Hat in Time"),
    (418370, "Subnautica"),
    (774281, "Subnautica: Below Zero"),
    (892970, "Valheim"),
    (945360, "Among Us"),
    (1203220, "NARAKA: BLADEPOINT"),
    (1172620, "Sea of Thieves"),
    (1091500, "Cyberpunk 2077"),
    (1245620, "ELDEN RING"),
    (1086940, "Baldur's Gate 3"),
    (1517290, "Battlefield 2042"),
    (1599340, "Call of Duty: Modern Warfare II"),
    (1938090, "Call of Duty: Modern Warfare III"),
    (1966720, "Hogwarts Legacy"),
    (1817070, "Marvel's Spider-Man Remastered"),
    (1888930, "Marvel's Spider-Man: Miles Morales"),
    (1623730, "Palworld"),
    (1868140, "DAVE THE DIVER"),
    (1449850, "Yu-Gi-Oh! Master Duel"),
    (1593500, "God of War"),
    (1817190, "Marvel's Guardians of the Galaxy"),
    (1237970, "Titanfall 2"),
    (1174370, "Phasmophobia"),
];

static POPULAR_GAMES: Lazy<Vec<GameInfo>> = Lazy::new(|| {
    GAMES
        .iter()
        .map(|&(appid, name)| GameInfo {
            appid,
            name: name.to_string(),
        })
        .collect()
});

/// The first `limit` games in popularity order
pub fn popular_games(limit: usize) -> Vec<GameInfo> {
    POPULAR_GAMES.iter().take(limit).cloned().collect()
}

/// Case-insensitive substring search over game names
pub fn search_games(query: &str, limit: usize) -> Vec<GameInfo> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Vec::new();
    }

    let needle = query.to_lowercase();
    POPULAR_GAMES
        .iter()
        .filter(|game| game.name.to_lowercase().contains(&needle))
        .take(limit)
        .cloned()
        .collect()
}

/// Look up a game by app id; unknown ids get a placeholder name
pub fn app_info(appid: u32) -> AppInfo {
    let name = POPULAR_GAMES
        .iter()
        .find(|game| game.appid == appid)
        .map(|game| game.name.clone())
        .unwrap_or_else(|| format!("Game {}", appid));

    AppInfo {
        appid,
        name,
        has_workshop: true,
        workshop_enabled: true,
    }
}

/// Games after `start_index`, split into batches of `batch_size`
pub fn additional_games(start_index: usize, batch_size: usize) -> Vec<Vec<GameInfo>> {
    let batch_size = batch_size.max(1);
    POPULAR_GAMES
        .iter()
        .skip(start_index)
        .cloned()
        .collect::<Vec<_>>()
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

pub fn len() -> usize {
    POPULAR_GAMES.len()
}
