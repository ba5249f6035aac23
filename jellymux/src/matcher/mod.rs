//! Fuzzy matching of external tracks to a video by file name.
//!
//! Candidates are grouped by kind and language. Each group contributes at
//! most one track: the one whose name is closest to the video's, provided it
//! is within the distance threshold. A tie for the closest name in any group
//! fails the whole match.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::tracks::{Track, TrackKind, language};
use crate::{Error, Result};

/// Default largest distance a track may have and still be selected.
pub const DEFAULT_MAX_DISTANCE: usize = 3;

/// Selects tracks for a video.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    max_distance: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE)
    }
}

impl Matcher {
    pub fn new(max_distance: usize) -> Self {
        Self { max_distance }
    }

    pub fn max_distance(&self) -> usize {
        self.max_distance
    }

    /// Pick at most one track per `(kind, language)` group.
    ///
    /// Groups are visited in key order, so when several groups tie the error
    /// always names the same one. Winners are returned in that order too.
    pub fn match_tracks(&self, video_path: &Path, candidates: &[Track]) -> Result<Vec<Track>> {
        let video_key = file_key(video_path);

        let mut groups: BTreeMap<(TrackKind, &str), Vec<&Track>> = BTreeMap::new();
        for track in candidates {
            groups
                .entry((track.kind, track.language.as_str()))
                .or_default()
                .push(track);
        }

        let mut selected = Vec::new();
        for ((kind, lang), tracks) in groups {
            let scored: Vec<(usize, &Track)> = tracks
                .into_iter()
                .map(|t| (levenshtein(&track_key(t), &video_key), t))
                .collect();

            let Some(best) = scored.iter().map(|(d, _)| *d).min() else {
                continue;
            };
            let mut winners = scored.iter().filter(|(d, _)| *d == best);
            let Some((_, winner)) = winners.next() else {
                continue;
            };
            if winners.next().is_some() {
                return Err(Error::MatchTie {
                    kind: kind.to_string(),
                    language: lang.to_string(),
                });
            }

            if best <= self.max_distance {
                debug!(
                    video = %video_path.display(),
                    track = %winner.path.display(),
                    %kind,
                    language = lang,
                    distance = best,
                    "Selected track"
                );
                selected.push((*winner).clone());
            } else {
                debug!(
                    video = %video_path.display(),
                    %kind,
                    language = lang,
                    distance = best,
                    max = self.max_distance,
                    "Closest track is too far off, skipping group"
                );
            }
        }

        Ok(selected)
    }
}

/// File name without directory and extension.
fn file_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Like [`file_key`], minus a trailing segment naming the track's language,
/// so `Movie.en.srt` compares as `Movie`.
fn track_key(track: &Track) -> String {
    let key = file_key(&track.path);
    match key.rsplit_once('.') {
        Some((base, tag)) if language::tag_matches(tag, &track.language) => base.to_string(),
        _ => key,
    }
}

/// Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(path: &str) -> Track {
        Track::from_path(Path::new(path)).unwrap()
    }

    fn names(tracks: &[Track]) -> Vec<String> {
        tracks
            .iter()
            .map(|t| t.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("Folge", "Fölge"), 1);
    }

    #[test]
    fn test_language_suffix_is_ignored() {
        assert_eq!(track_key(&track("/tv/Show.S01E01.en.srt")), "Show.S01E01");
        assert_eq!(track_key(&track("/tv/Show.S01E01.mka")), "Show.S01E01");
        // Segment names a different language than the one detected.
        let mut t = track("/tv/Show.S01E01.en.srt");
        t.language = "jpn".to_string();
        assert_eq!(track_key(&t), "Show.S01E01.en");
    }

    #[test]
    fn test_closest_candidate_wins_regardless_of_order() {
        let video = Path::new("/tv/Show.S01E01.mkv");
        let exact = track("/tv/Show.S01E01.en.srt");
        let near = track("/tv/Show.S01E01x.en.srt");
        let matcher = Matcher::default();

        let forward = matcher
            .match_tracks(video, &[exact.clone(), near.clone()])
            .unwrap();
        let backward = matcher.match_tracks(video, &[near, exact]).unwrap();

        assert_eq!(names(&forward), vec!["Show.S01E01.en.srt"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_one_winner_per_group() {
        let video = Path::new("/tv/Show.S01E01.mkv");
        let candidates = vec![
            track("/tv/Show.S01E01.en.srt"),
            track("/tv/Show.S01E02.en.srt"),
            track("/tv/Show.S01E01.ja.ass"),
            track("/tv/Show.S01E01.mka"),
        ];

        let selected = Matcher::default().match_tracks(video, &candidates).unwrap();

        assert_eq!(
            names(&selected),
            vec!["Show.S01E01.mka", "Show.S01E01.en.srt", "Show.S01E01.ja.ass"]
        );
    }

    #[test]
    fn test_tie_aborts_all_groups() {
        let video = Path::new("/m/Movie.mkv");
        let candidates = vec![
            track("/m/Movie.mka"),
            track("/m/Movie.A.en.srt"),
            track("/m/Movie.B.en.srt"),
        ];

        let err = Matcher::default()
            .match_tracks(video, &candidates)
            .unwrap_err();

        match err {
            Error::MatchTie { kind, language } => {
                assert_eq!(kind, "subtitle");
                assert_eq!(language, "eng");
            }
            other => panic!("expected tie, got {other:?}"),
        }
    }

    #[test]
    fn test_tie_reported_for_first_group_in_order() {
        let video = Path::new("/m/Movie.mkv");
        let candidates = vec![
            track("/m/Movie.A.en.srt"),
            track("/m/Movie.B.en.srt"),
            track("/m/Movie.A.mka"),
            track("/m/Movie.B.mka"),
        ];

        for _ in 0..5 {
            let err = Matcher::default()
                .match_tracks(video, &candidates)
                .unwrap_err();
            assert!(
                matches!(&err, Error::MatchTie { kind, .. } if kind == "audio"),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_tie_beyond_threshold_still_fails() {
        let video = Path::new("/m/Movie.mkv");
        let candidates = vec![track("/m/Movie.AAAAA.srt"), track("/m/Movie.BBBBB.srt")];

        let result = Matcher::default().match_tracks(video, &candidates);

        assert!(matches!(result, Err(Error::MatchTie { .. })));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let video = Path::new("/m/Movie.mkv");
        let matcher = Matcher::new(3);

        let within = matcher
            .match_tracks(video, &[track("/m/Movie123.srt")])
            .unwrap();
        assert_eq!(names(&within), vec!["Movie123.srt"]);

        let beyond = matcher
            .match_tracks(video, &[track("/m/Movie1234.srt")])
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_no_candidates() {
        let selected = Matcher::default()
            .match_tracks(Path::new("/m/Movie.mkv"), &[])
            .unwrap();
        assert!(selected.is_empty());
    }
}
