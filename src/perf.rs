//! Batch decoding.
//!
//! [`decode_many`] decodes a slice of independent trace files.  Containers,
//! registries and stages keep no state between files, so with the `parallel`
//! feature the batch is spread over Rayon's global pool with no locking.
//! Without it the same work runs sequentially.
//!
//! Each file gets its own `Result`: one corrupt trace does not abort the
//! batch.

use crate::chromatogram::Chromatogram;
use crate::error::Result;
use crate::format::{self, TraceFormat};

/// Decode every buffer, sniffing each one's format.  Results come back in
/// input order.
pub fn decode_many(files: &[&[u8]]) -> Vec<Result<Chromatogram>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        files.par_iter().map(|data| format::decode(data)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        files.iter().map(|data| format::decode(data)).collect()
    }
}

/// Decode every buffer as `format`.
pub fn decode_many_as(files: &[&[u8]], format: TraceFormat) -> Vec<Result<Chromatogram>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        files.par_iter().map(|data| format::decode_as(data, format)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        files.iter().map(|data| format::decode_as(data, format)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatogram::ChannelId;
    use crate::options::EncodeOptions;

    fn encoded(format: TraceFormat, n: u16) -> Vec<u8> {
        let trace = Chromatogram::builder()
            .basecalls("AT")
            .qualities(vec![n as u8, 2])
            .samples(ChannelId::A, vec![n; 4])
            .samples(ChannelId::C, vec![0; 4])
            .samples(ChannelId::G, vec![0; 4])
            .samples(ChannelId::T, vec![n + 1; 4])
            .build()
            .unwrap();
        format::encode(&trace, format, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn batch_keeps_input_order() {
        let files: Vec<Vec<u8>> = (0..12u16)
            .map(|i| encoded(TraceFormat::ALL[i as usize % 3], i))
            .collect();
        let refs: Vec<&[u8]> = files.iter().map(Vec::as_slice).collect();
        let decoded = decode_many(&refs);
        assert_eq!(decoded.len(), 12);
        for (i, result) in decoded.into_iter().enumerate() {
            assert_eq!(result.unwrap().channels().a().samples, vec![i as u16; 4]);
        }
    }

    #[test]
    fn one_bad_file_does_not_sink_the_batch() {
        let good = encoded(TraceFormat::Ztr, 3);
        let files = [good.as_slice(), &b"not a trace"[..], good.as_slice()];
        let decoded = decode_many(&files);
        assert!(decoded[0].is_ok());
        assert!(decoded[1].as_ref().unwrap_err().is_unsupported());
        assert!(decoded[2].is_ok());
    }

    #[test]
    fn forced_format_rejects_other_containers() {
        let scf = encoded(TraceFormat::Scf, 1);
        let decoded = decode_many_as(&[&scf], TraceFormat::Ztr);
        assert!(decoded[0].as_ref().unwrap_err().is_unsupported());
    }
}
