#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::error::SelectionError;
use crate::video::VideoRecord;

/// What the user asked to download from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Indices(BTreeSet<usize>),
    All,
    Quit,
}

impl Selection {
    /// Accepts `q`/`quit`, `all`, or comma separated 1-based indices such as
    /// `1, 3,5`. Anything else is rejected before any work starts.
    pub fn parse(input: &str) -> Result<Self, SelectionError> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err(SelectionError::InvalidSelection(input.to_string())),
            "q" | "quit" => Ok(Selection::Quit),
            "all" => Ok(Selection::All),
            _ => normalized
                .split(',')
                .map(|token| {
                    let token = token.trim();
                    token
                        .parse::<usize>()
                        .map_err(|_| SelectionError::InvalidSelection(token.to_string()))
                })
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Selection::Indices),
        }
    }

    /// Chosen records in listing order. Indices outside the listing are
    /// ignored; `Quit` selects nothing.
    pub fn apply<'v>(&self, videos: &'v [VideoRecord]) -> Vec<&'v VideoRecord> {
        match self {
            Selection::Quit => Vec::new(),
            Selection::All => videos.iter().collect(),
            Selection::Indices(indices) => videos
                .iter()
                .filter(|video| indices.contains(&video.index))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::watch_url;

    fn listing(count: usize) -> Vec<VideoRecord> {
        (1..=count)
            .map(|index| VideoRecord {
                index,
                id: format!("v{index}"),
                title: format!("Video {index}"),
                url: watch_url(&format!("v{index}")),
                duration: 0,
            })
            .collect()
    }

    #[test]
    fn picks_requested_indices_in_listing_order() -> anyhow::Result<()> {
        let videos = listing(3);
        let chosen = Selection::parse("1,3")?.apply(&videos);
        let indices: Vec<usize> = chosen.iter().map(|v| v.index).collect();
        assert_eq!(indices, vec![1, 3]);

        let reversed = Selection::parse(" 3 , 1,1 ")?.apply(&videos);
        let indices: Vec<usize> = reversed.iter().map(|v| v.index).collect();
        assert_eq!(indices, vec![1, 3]);
        Ok(())
    }

    #[test]
    fn all_and_quit_keywords() -> anyhow::Result<()> {
        let videos = listing(4);
        assert_eq!(Selection::parse("ALL")?.apply(&videos).len(), 4);
        assert_eq!(Selection::parse(" q ")?, Selection::Quit);
        assert_eq!(Selection::parse("Quit")?, Selection::Quit);
        assert!(Selection::Quit.apply(&videos).is_empty());
        Ok(())
    }

    #[test]
    fn out_of_range_indices_select_nothing() -> anyhow::Result<()> {
        let videos = listing(2);
        assert!(Selection::parse("0,7")?.apply(&videos).is_empty());
        Ok(())
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "   ", "1,,2", "one", "1;2", "-1", "2.5"] {
            assert!(
                matches!(Selection::parse(input), Err(SelectionError::InvalidSelection(_))),
                "{input:?} should be rejected"
            );
        }
        assert_eq!(
            Selection::parse("1, x"),
            Err(SelectionError::InvalidSelection("x".to_string()))
        );
    }
}
