//! ADTS (AAC) fixed + variable header parser

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::constants::{
    AAC_HEADER_SIZE, AAC_MAX_FRAME_LENGTH, AAC_MIN_FRAME_LENGTH, AAC_SAMPLES_PER_FRAME,
    AAC_SAMPLE_RATES,
};
use crate::error::HeaderError;
use crate::types::{AacFields, FrameFormat, FrameHeader, HeaderFields};

struct RawAdts {
    syncword: u16,
    protection_absent: bool,
    profile: u8,
    sf_index: u8,
    channel_config: u8,
    frame_length: u16,
}

fn read_raw(data: &[u8]) -> std::io::Result<RawAdts> {
    let mut br = BitReader::endian(data, BigEndian);
    let syncword = br.read::<12, u16>()?;
    br.skip(3)?; // id + layer
    let protection_absent = br.read_bit()?;
    let profile = br.read::<2, u8>()?;
    let sf_index = br.read::<4, u8>()?;
    br.skip(1)?; // private bit
    let channel_config = br.read::<3, u8>()?;
    br.skip(4)?; // original/copy, home, copyright bits
    let frame_length = br.read::<13, u16>()?;
    Ok(RawAdts {
        syncword,
        protection_absent,
        profile,
        sf_index,
        channel_config,
        frame_length,
    })
}

/// Frame length of anything carrying the ADTS syncword, other fields unchecked
pub fn adts_sync_length(data: &[u8]) -> Option<usize> {
    let raw = read_raw(data.get(..AAC_HEADER_SIZE)?).ok()?;
    let frame_length = raw.frame_length as usize;
    (raw.syncword == 0x0FFF
        && (AAC_MIN_FRAME_LENGTH..=AAC_MAX_FRAME_LENGTH).contains(&frame_length))
    .then_some(frame_length)
}

/// Parse a 7-byte ADTS header
pub fn parse_adts_header(data: &[u8]) -> Result<FrameHeader, HeaderError> {
    if data.len() < AAC_HEADER_SIZE {
        return Err(HeaderError::Truncated(data.len()));
    }
    let raw = read_raw(&data[..AAC_HEADER_SIZE]).map_err(|_| HeaderError::Truncated(data.len()))?;

    if raw.syncword != 0x0FFF {
        return Err(HeaderError::BadSync);
    }
    if raw.profile == 3 {
        return Err(HeaderError::ReservedProfile);
    }
    let sample_rate = AAC_SAMPLE_RATES[raw.sf_index as usize];
    if sample_rate == 0 {
        return Err(HeaderError::BadSamplingIndex(raw.sf_index));
    }
    if !(1..=7).contains(&raw.channel_config) {
        return Err(HeaderError::BadChannelConfig(raw.channel_config));
    }
    let frame_length = raw.frame_length as usize;
    if !(AAC_MIN_FRAME_LENGTH..=AAC_MAX_FRAME_LENGTH).contains(&frame_length) {
        return Err(HeaderError::BadFrameLength(raw.frame_length));
    }

    Ok(FrameHeader {
        format: FrameFormat::Aac,
        sample_rate,
        frame_length,
        samples_per_frame: AAC_SAMPLES_PER_FRAME,
        fields: HeaderFields::Aac(AacFields {
            profile: raw.profile,
            channel_config: raw.channel_config,
            protection_absent: raw.protection_absent,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::adts_header;

    #[test]
    fn valid_header_reports_frame_length() {
        let h = adts_header(1, 4, 2, 200, true);
        let parsed = parse_adts_header(&h).unwrap();
        assert_eq!(parsed.frame_length, 200);
        assert_eq!(parsed.sample_rate, 44100);
        assert_eq!(parsed.channels(), 2);
        assert_eq!(parsed.samples_per_frame, 1024);
        assert_eq!(crate::parsers::validate_header(FrameFormat::Aac, &h), Some(200));
    }

    #[test]
    fn reserved_profile_is_rejected_regardless_of_other_fields() {
        for (sf, ch, len) in [(4, 2, 200), (3, 1, 7), (11, 7, 5000)] {
            let h = adts_header(3, sf, ch, len, true);
            assert_eq!(parse_adts_header(&h), Err(HeaderError::ReservedProfile));
        }
    }

    #[test]
    fn invalid_fields() {
        assert_eq!(
            parse_adts_header(&adts_header(1, 13, 2, 200, true)),
            Err(HeaderError::BadSamplingIndex(13))
        );
        assert_eq!(
            parse_adts_header(&adts_header(1, 4, 0, 200, true)),
            Err(HeaderError::BadChannelConfig(0))
        );
        assert_eq!(
            parse_adts_header(&adts_header(1, 4, 2, 6, true)),
            Err(HeaderError::BadFrameLength(6))
        );
        assert_eq!(
            parse_adts_header(&adts_header(1, 4, 2, 5001, true)),
            Err(HeaderError::BadFrameLength(5001))
        );

        let mut h = adts_header(1, 4, 2, 200, true);
        h[1] &= 0x0F;
        assert_eq!(parse_adts_header(&h), Err(HeaderError::BadSync));
        assert_eq!(parse_adts_header(&h[..5]), Err(HeaderError::Truncated(5)));
    }

    #[test]
    fn crc_flag_is_exposed() {
        let parsed = parse_adts_header(&adts_header(1, 3, 2, 300, false)).unwrap();
        assert_eq!(parsed.crc_len(), 2);
        assert_eq!(parsed.sample_rate, 48000);
    }
}
