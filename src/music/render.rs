//! Chat renderings of queue entries and music replies

use super::QueueEntry;
use crate::db::HistoryRecord;

/// Emoji that re-queues the track of an announcement
pub const REPEAT_EMOJI: &str = "\u{1F501}";

/// Emoji that favorites the track of an announcement
pub const FAVORITE_EMOJI: &str = "\u{2B50}";

/// Command reference sent by `help`
pub const HELP: &str = "Komendy do muzyki: \n \
**!join <channel>** - dołącz bota do kanału (można przenosić manualnie) \n \
**!play <url>** - dodaj piosenkę do kolejki \n \
**!pause** i **!resume** - pauzuj i kontynuuj odtwarzanie \n \
**!skip** - przejdź do następnej piosenki w kolejce \n \
**!say <tekst>** - powiedz tekst na kanale głosowym \n \
**!favorites** - pokaż swoje ulubione piosenki \n\n \
Dodaj reakcję :repeat: (repeat) do piosenki, a bot doda ją ponownie do kolejki! \
Reakcja :star: doda ją do ulubionych.";

/// Lifecycle stage shown on a track announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Queued,
    Playing,
    Paused,
    Skipped,
    Finished,
    Failed,
}

impl TrackStatus {
    const fn marker(self) -> &'static str {
        match self {
            Self::Queued => ":heavy_plus_sign:",
            Self::Playing => ":arrow_forward:",
            Self::Paused => ":pause_button:",
            Self::Skipped => ":fast_forward:",
            Self::Finished => ":heavy_check_mark:",
            Self::Failed => ":warning:",
        }
    }
}

/// Announcement text for a track
#[must_use]
pub fn announcement(status: TrackStatus, title: &str, url: &str, requester_mention: &str) -> String {
    format!(
        "{} **{title}** \n :link: <{url}> \n :point_right: {requester_mention}",
        status.marker()
    )
}

impl QueueEntry {
    /// Render this entry's announcement at `status`
    #[must_use]
    pub fn render(&self, status: TrackStatus) -> String {
        announcement(status, &self.track.title, &self.url, &self.requester.mention())
    }
}

/// Reply for a URL that could not be resolved
#[must_use]
pub fn rejection(url: &str) -> String {
    format!(":x: <{url}>")
}

/// Reply after joining a voice channel
#[must_use]
pub fn joined(channel_name: &str) -> String {
    format!(":door: **{channel_name}**")
}

/// List of a user's favorites
#[must_use]
pub fn favorites(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return ":star: Brak ulubionych piosenek".to_string();
    }

    records
        .iter()
        .map(|r| {
            let title = r.title.as_deref().unwrap_or(r.url.as_str());
            format!(":star: **{title}** \n :link: <{}>", r.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
