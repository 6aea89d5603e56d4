//! Speech-paced gating of tool calls in a model response stream.
//!
//! Text deltas are forwarded the moment they arrive so speech synthesis can
//! start immediately. Tool-call deltas are held back until the upstream
//! stream is exhausted, then released after a wait long enough for the
//! synthesizer to finish speaking the narration that preceded them.
//!
//! Within a turn every forwarded text fragment is delivered before any
//! buffered tool fragment. The only suspension is the pacing wait; dropping
//! the output stream while it is pending cancels the wait and nothing
//! further is released.

use crate::pacing::{count_words, SpeechPacing};
use futures_util::stream::{self, Stream, StreamExt};
use murmur_types::ResponseFragment;
use std::future::{self as std_future, Future};
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Per-turn gate state.
///
/// Created when the gate starts consuming a stream and dropped once the
/// buffered tool fragments are released.
#[derive(Debug)]
pub struct GateSession {
    pacing: SpeechPacing,
    text_fragments: usize,
    tool_fragments: Vec<ResponseFragment>,
    word_count: usize,
}

impl GateSession {
    pub fn new(pacing: SpeechPacing) -> Self {
        Self {
            pacing,
            text_fragments: 0,
            tool_fragments: Vec::new(),
            word_count: 0,
        }
    }

    /// Classifies one fragment.
    ///
    /// Returns the fragment when it must be forwarded now. A fragment with
    /// both text and tool calls is forwarded now and also kept for release.
    pub fn observe(&mut self, fragment: ResponseFragment) -> Option<ResponseFragment> {
        let Some((text_words, has_tool_calls)) = fragment
            .delta()
            .map(|delta| (delta.text().map(count_words), delta.has_tool_calls()))
        else {
            debug!("forwarding fragment without delta");
            return Some(fragment);
        };

        if let Some(words) = text_words {
            self.text_fragments += 1;
            self.word_count += words;
            debug!(words, "forwarding text fragment");
        }

        match (text_words.is_some(), has_tool_calls) {
            (true, true) => {
                self.tool_fragments.push(fragment.clone());
                Some(fragment)
            }
            (false, true) => {
                debug!(buffered = self.tool_fragments.len() + 1, "buffering tool-call fragment");
                self.tool_fragments.push(fragment);
                None
            }
            (_, false) => Some(fragment),
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn buffered_tool_fragments(&self) -> usize {
        self.tool_fragments.len()
    }

    /// The wait before buffered tool fragments may be released.
    ///
    /// `None` when nothing is buffered.
    pub fn release_delay(&self) -> Option<std::time::Duration> {
        if self.tool_fragments.is_empty() {
            return None;
        }
        let narrated = (self.text_fragments > 0).then_some(self.word_count);
        Some(self.pacing.tool_release_delay(narrated))
    }

    /// Waits out the pacing delay and hands back the buffered tool
    /// fragments in arrival order.
    pub async fn finish(self) -> Vec<ResponseFragment> {
        if let Some(delay) = self.release_delay() {
            info!(
                words = self.word_count,
                text_fragments = self.text_fragments,
                tool_fragments = self.tool_fragments.len(),
                wait_ms = delay.as_millis() as u64,
                "holding tool calls until narration is spoken"
            );
            tokio::time::sleep(delay).await;
        }
        self.tool_fragments
    }
}

enum GateState<F, S> {
    Resolving(F, GateSession),
    Streaming(Pin<Box<S>>, GateSession),
    Releasing(std::vec::IntoIter<ResponseFragment>),
    Done,
}

/// Applies speech pacing to model response streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeechGate {
    pacing: SpeechPacing,
}

impl SpeechGate {
    pub fn new(pacing: SpeechPacing) -> Self {
        Self { pacing }
    }

    pub fn pacing(&self) -> &SpeechPacing {
        &self.pacing
    }

    /// Gates a deferred stream.
    ///
    /// `upstream` is resolved once. If it yields `None` the output is empty;
    /// if it fails, the error is the only item. Upstream errors during
    /// iteration are passed through and end the output, discarding any
    /// buffered tool fragments.
    pub fn apply<F, S, E>(&self, upstream: F) -> impl Stream<Item = Result<ResponseFragment, E>>
    where
        F: Future<Output = Result<Option<S>, E>>,
        S: Stream<Item = Result<ResponseFragment, E>>,
    {
        let initial = GateState::Resolving(upstream, GateSession::new(self.pacing));

        stream::unfold(initial, |mut state| async move {
            loop {
                state = match state {
                    GateState::Resolving(upstream, session) => match upstream.await {
                        Ok(Some(fragments)) => GateState::Streaming(Box::pin(fragments), session),
                        Ok(None) => {
                            debug!("upstream resolved to no stream");
                            return None;
                        }
                        Err(e) => return Some((Err(e), GateState::Done)),
                    },
                    GateState::Streaming(mut fragments, mut session) => {
                        match fragments.next().await {
                            Some(Ok(fragment)) => match session.observe(fragment) {
                                Some(forward) => {
                                    return Some((
                                        Ok(forward),
                                        GateState::Streaming(fragments, session),
                                    ))
                                }
                                None => GateState::Streaming(fragments, session),
                            },
                            Some(Err(e)) => {
                                if session.buffered_tool_fragments() > 0 {
                                    warn!(
                                        discarded = session.buffered_tool_fragments(),
                                        "upstream failed, dropping buffered tool calls"
                                    );
                                }
                                return Some((Err(e), GateState::Done));
                            }
                            None => GateState::Releasing(session.finish().await.into_iter()),
                        }
                    }
                    GateState::Releasing(mut pending) => {
                        return pending
                            .next()
                            .map(|fragment| (Ok(fragment), GateState::Releasing(pending)));
                    }
                    GateState::Done => return None,
                };
            }
        })
    }

    /// Gates a stream that is already available.
    pub fn apply_ready<S, E>(&self, fragments: S) -> impl Stream<Item = Result<ResponseFragment, E>>
    where
        S: Stream<Item = Result<ResponseFragment, E>>,
    {
        self.apply(std_future::ready(Ok::<_, E>(Some(fragments))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_types::{ChatChunk, ChoiceDelta, StreamMarker, ToolCallDelta};
    use std::time::Duration;

    fn tool(name: &str) -> ResponseFragment {
        ResponseFragment::tool_calls("c", vec![ToolCallDelta::new(0, "call_0", name)])
    }

    #[test]
    fn observe_forwards_markers_and_empty_deltas() {
        let mut session = GateSession::new(SpeechPacing::default());
        let marker = ResponseFragment::Marker(StreamMarker::Flush);
        assert_eq!(session.observe(marker.clone()), Some(marker));

        let empty = ResponseFragment::Chunk(ChatChunk {
            id: "c".to_string(),
            delta: Some(ChoiceDelta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
                tool_calls: Vec::new(),
            }),
        });
        assert_eq!(session.observe(empty.clone()), Some(empty));
        assert_eq!(session.release_delay(), None);
    }

    #[test]
    fn observe_buffers_tool_calls() {
        let mut session = GateSession::new(SpeechPacing::default());
        assert_eq!(session.observe(tool("check_status")), None);
        assert_eq!(session.buffered_tool_fragments(), 1);
        assert_eq!(session.release_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn observe_counts_words_across_fragments() {
        let mut session = GateSession::new(SpeechPacing::default());
        session.observe(ResponseFragment::text("c", "One moment, "));
        session.observe(ResponseFragment::text("c", "checking now."));
        session.observe(tool("check_status"));
        assert_eq!(session.word_count(), 4);

        let delay = session.release_delay().unwrap();
        assert!((delay.as_secs_f64() - 2.6).abs() < 1e-9);
    }

    #[test]
    fn whitespace_text_counts_as_narration() {
        let mut session = GateSession::new(SpeechPacing::default());
        session.observe(ResponseFragment::text("c", "  "));
        session.observe(tool("check_status"));
        assert_eq!(session.word_count(), 0);
        assert_eq!(session.release_delay(), Some(Duration::from_secs(1)));
    }
}
