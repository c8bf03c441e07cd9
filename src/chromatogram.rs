//! In-memory chromatogram shared by every container format.
//!
//! A [`Chromatogram`] is immutable.  Decoders accumulate fields in a
//! [`ChromatogramBuilder`] that is threaded by value through the parse loop
//! and frozen by [`ChromatogramBuilder::build`], which checks the invariants:
//!
//! - all four channels carry the same number of samples;
//! - peaks, qualities and per-channel confidences are either empty or have
//!   one entry per basecall.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, TraceError};

// ── Channels ─────────────────────────────────────────────────────────────────

/// One of the four dye channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelId {
    A,
    C,
    G,
    T,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [ChannelId::A, ChannelId::C, ChannelId::G, ChannelId::T];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            ChannelId::A => 0,
            ChannelId::C => 1,
            ChannelId::G => 2,
            ChannelId::T => 3,
        }
    }

    /// The channel a basecall refers to; ambiguity codes have none.
    pub fn from_base(base: u8) -> Option<Self> {
        match base.to_ascii_uppercase() {
            b'A' => Some(ChannelId::A),
            b'C' => Some(ChannelId::C),
            b'G' => Some(ChannelId::G),
            b'T' => Some(ChannelId::T),
            _    => None,
        }
    }

    pub fn letter(self) -> u8 {
        b"ACGT"[self.index()]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Raw signal intensity per sample point.
    pub samples:    Vec<u16>,
    /// Confidence that each basecall is this channel's base.
    pub confidence: Vec<u8>,
}

/// The four co-indexed channels of a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelGroup {
    channels: [Channel; 4],
}

impl ChannelGroup {
    pub fn get(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn a(&self) -> &Channel { self.get(ChannelId::A) }
    pub fn c(&self) -> &Channel { self.get(ChannelId::C) }
    pub fn g(&self) -> &Channel { self.get(ChannelId::G) }
    pub fn t(&self) -> &Channel { self.get(ChannelId::T) }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        self.channels[0].samples.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        ChannelId::ALL.into_iter().zip(self.channels.iter())
    }

    pub fn max_sample(&self) -> u16 {
        self.channels.iter().flat_map(|c| c.samples.iter().copied()).max().unwrap_or(0)
    }
}

/// Quality clip points, in 1-based base coordinates as the formats store them.
///
/// `(0, 0)` is how SCF marks "no clip", so the builder treats it as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClipRange {
    pub left:  u32,
    pub right: u32,
}

impl ClipRange {
    pub fn is_unset(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

// ── Chromatogram ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chromatogram {
    basecalls:    String,
    peaks:        Vec<u32>,
    qualities:    Vec<u8>,
    channels:     ChannelGroup,
    comments:     BTreeMap<String, String>,
    private_data: Option<Vec<u8>>,
    clip:         Option<ClipRange>,
}

impl Chromatogram {
    pub fn builder() -> ChromatogramBuilder {
        ChromatogramBuilder::default()
    }

    pub fn basecalls(&self) -> &str { &self.basecalls }
    pub fn peaks(&self) -> &[u32] { &self.peaks }
    /// Confidence of the called base at each position.
    pub fn qualities(&self) -> &[u8] { &self.qualities }
    pub fn channels(&self) -> &ChannelGroup { &self.channels }
    pub fn comments(&self) -> &BTreeMap<String, String> { &self.comments }
    pub fn private_data(&self) -> Option<&[u8]> { self.private_data.as_deref() }
    pub fn clip(&self) -> Option<ClipRange> { self.clip }

    pub fn base_count(&self) -> usize { self.basecalls.len() }
    pub fn sample_count(&self) -> usize { self.channels.sample_count() }

    /// Reopen the trace for editing.
    pub fn into_builder(self) -> ChromatogramBuilder {
        let [a, c, g, t] = self.channels.channels;
        ChromatogramBuilder {
            basecalls:    Some(self.basecalls),
            peaks:        self.peaks,
            qualities:    self.qualities,
            samples:      [Some(a.samples), Some(c.samples), Some(g.samples), Some(t.samples)],
            confidence:   [a.confidence, c.confidence, g.confidence, t.confidence],
            comments:     self.comments,
            private_data: self.private_data,
            clip:         self.clip,
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Accumulates decoded fields section by section.
#[derive(Debug, Clone, Default)]
pub struct ChromatogramBuilder {
    basecalls:    Option<String>,
    peaks:        Vec<u32>,
    qualities:    Vec<u8>,
    samples:      [Option<Vec<u16>>; 4],
    confidence:   [Vec<u8>; 4],
    comments:     BTreeMap<String, String>,
    private_data: Option<Vec<u8>>,
    clip:         Option<ClipRange>,
}

impl ChromatogramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn basecalls(mut self, basecalls: impl Into<String>) -> Self {
        self.basecalls = Some(basecalls.into());
        self
    }

    pub fn peaks(mut self, peaks: Vec<u32>) -> Self {
        self.peaks = peaks;
        self
    }

    pub fn qualities(mut self, qualities: Vec<u8>) -> Self {
        self.qualities = qualities;
        self
    }

    pub fn samples(mut self, channel: ChannelId, samples: Vec<u16>) -> Self {
        self.samples[channel.index()] = Some(samples);
        self
    }

    pub fn confidence(mut self, channel: ChannelId, confidence: Vec<u8>) -> Self {
        self.confidence[channel.index()] = confidence;
        self
    }

    pub fn comment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.comments.insert(key.into(), value.into());
        self
    }

    pub fn comments(mut self, comments: BTreeMap<String, String>) -> Self {
        self.comments.extend(comments);
        self
    }

    pub fn private_data(mut self, data: Vec<u8>) -> Self {
        self.private_data = Some(data);
        self
    }

    pub fn clip(mut self, clip: ClipRange) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Basecalls decoded so far, for sections that are interpreted relative
    /// to the called base.
    pub fn current_basecalls(&self) -> Option<&str> {
        self.basecalls.as_deref()
    }

    /// Freeze the accumulated fields into an immutable trace.
    pub fn build(self) -> Result<Chromatogram> {
        let basecalls = self.basecalls.unwrap_or_default();
        if !basecalls.is_ascii() {
            return Err(TraceError::InvalidTrace("basecalls must be ASCII".into()));
        }
        let n = basecalls.len();

        let sample_count = self.samples.iter().flatten().map(Vec::len).max().unwrap_or(0);
        let samples = self.samples.map(|s| s.unwrap_or_default());
        for (id, s) in ChannelId::ALL.iter().zip(samples.iter()) {
            if s.len() != sample_count {
                return Err(TraceError::InvalidTrace(format!(
                    "channel {:?} has {} samples, expected {}",
                    id, s.len(), sample_count
                )));
            }
        }

        check_per_base("peaks", self.peaks.len(), n)?;
        check_per_base("qualities", self.qualities.len(), n)?;
        for (id, conf) in ChannelId::ALL.iter().zip(self.confidence.iter()) {
            check_per_base(&format!("channel {id:?} confidence"), conf.len(), n)?;
        }

        let mut confidence = self.confidence;
        let has_confidence = confidence.iter().any(|c| !c.is_empty());
        if has_confidence {
            for conf in confidence.iter_mut().filter(|c| c.is_empty()) {
                *conf = vec![0; n];
            }
        }
        let qualities = match (self.qualities.is_empty(), has_confidence) {
            (true, false) => Vec::new(),
            (false, false) => {
                confidence = spread_qualities(basecalls.as_bytes(), &self.qualities);
                self.qualities
            }
            (true, true) => called_qualities(basecalls.as_bytes(), &confidence),
            // Formats that store confidences recompute qualities from them.
            (false, true) => {
                let called = called_qualities(basecalls.as_bytes(), &confidence);
                if let Some(i) = (0..n).find(|&i| called[i] != self.qualities[i]) {
                    return Err(TraceError::InvalidTrace(format!(
                        "quality {} of base {i} disagrees with its called-channel confidence {}",
                        self.qualities[i], called[i]
                    )));
                }
                self.qualities
            }
        };

        let [sa, sc, sg, st] = samples;
        let [ca, cc, cg, ct] = confidence;
        let channels = ChannelGroup {
            channels: [
                Channel { samples: sa, confidence: ca },
                Channel { samples: sc, confidence: cc },
                Channel { samples: sg, confidence: cg },
                Channel { samples: st, confidence: ct },
            ],
        };

        Ok(Chromatogram {
            basecalls,
            peaks: self.peaks,
            qualities,
            channels,
            comments: self.comments,
            private_data: self.private_data.filter(|d| !d.is_empty()),
            clip: self.clip.filter(|c| !c.is_unset()),
        })
    }
}

fn check_per_base(what: &str, len: usize, bases: usize) -> Result<()> {
    if len != 0 && len != bases {
        return Err(TraceError::InvalidTrace(format!("{what} has {len} entries for {bases} bases")));
    }
    Ok(())
}

/// Confidence of the called channel; ambiguity codes take the best channel.
fn called_qualities(bases: &[u8], confidence: &[Vec<u8>; 4]) -> Vec<u8> {
    bases
        .iter()
        .enumerate()
        .map(|(i, &b)| match ChannelId::from_base(b) {
            Some(id) => confidence[id.index()][i],
            None     => confidence.iter().map(|c| c[i]).max().unwrap_or(0),
        })
        .collect()
}

/// Inverse of [`called_qualities`] for formats that only store the call's
/// quality: the called channel gets it, ambiguity codes give it to all four.
fn spread_qualities(bases: &[u8], qualities: &[u8]) -> [Vec<u8>; 4] {
    let mut confidence: [Vec<u8>; 4] = Default::default();
    for conf in confidence.iter_mut() {
        *conf = vec![0; bases.len()];
    }
    for (i, (&b, &q)) in bases.iter().zip(qualities).enumerate() {
        match ChannelId::from_base(b) {
            Some(id) => confidence[id.index()][i] = q,
            None => confidence.iter_mut().for_each(|c| c[i] = q),
        }
    }
    confidence
}
