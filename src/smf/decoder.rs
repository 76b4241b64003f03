use tracing::{debug, warn};

use super::ByteCursor;
use crate::error::ParseError;
use crate::events::{NoteMessage, RawEvent, RawEventKind};

const HEADER_TAG: &str = "MThd";
const TRACK_TAG: &str = "MTrk";
const HEADER_BODY_LEN: u32 = 6;

const META: u8 = 0xFF;
const META_TEMPO: u8 = 0x51;
const META_END_OF_TRACK: u8 = 0x2F;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;
const MTC_QUARTER_FRAME: u8 = 0xF1;
const SONG_POSITION: u8 = 0xF2;
const SONG_SELECT: u8 = 0xF3;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const PROGRAM_CHANGE: u8 = 0xC0;
const CHANNEL_PRESSURE: u8 = 0xD0;

/// A decoded Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smf {
    pub format: u16,
    /// Ticks per quarter note. Always non-zero.
    pub division: u16,
    pub tracks: Vec<Vec<RawEvent>>,
    /// Tags of chunks that were skipped because they were not track chunks.
    pub skipped_chunks: Vec<String>,
}

/// Result of [`SmfDecoder::decode_partial`]: whatever decoded cleanly, plus
/// the error that ended decoding early, if any.
#[derive(Debug, Clone)]
pub struct PartialSmf {
    pub smf: Smf,
    pub error: Option<ParseError>,
}

pub struct SmfDecoder;

impl SmfDecoder {
    /// Decodes `bytes`, failing on the first malformed chunk.
    pub fn decode(bytes: &[u8]) -> Result<Smf, ParseError> {
        let partial = Self::decode_partial(bytes)?;
        match partial.error {
            Some(err) => Err(err),
            None => Ok(partial.smf),
        }
    }

    /// Decodes `bytes`, keeping every track that decoded before a malformed
    /// chunk. Only header failures are returned as `Err`.
    pub fn decode_partial(bytes: &[u8]) -> Result<PartialSmf, ParseError> {
        let mut cursor = ByteCursor::new(bytes);
        let header = read_header(&mut cursor)?;

        let mut smf = Smf {
            format: header.format,
            division: header.division,
            tracks: Vec::with_capacity(header.track_count as usize),
            skipped_chunks: Vec::new(),
        };

        while smf.tracks.len() < header.track_count as usize && !cursor.is_empty() {
            match read_chunk(&mut cursor, &mut smf) {
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        "MIDI decode stopped after {} track(s): {}",
                        smf.tracks.len(),
                        err
                    );
                    return Ok(PartialSmf {
                        smf,
                        error: Some(err),
                    });
                }
            }
        }

        if smf.tracks.len() < header.track_count as usize {
            debug!(
                "header declared {} track(s), found {}",
                header.track_count,
                smf.tracks.len()
            );
        }

        Ok(PartialSmf { smf, error: None })
    }
}

struct Header {
    format: u16,
    track_count: u16,
    division: u16,
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<Header, ParseError> {
    let tag = cursor
        .read_ascii(4)
        .map_err(|_| ParseError::InvalidHeader {
            found: String::new(),
        })?;
    if tag != HEADER_TAG {
        return Err(ParseError::InvalidHeader { found: tag });
    }

    let length = cursor.read_u32()?;
    let format = cursor.read_u16()?;
    let track_count = cursor.read_u16()?;
    let division = cursor.read_u16()?;
    if length > HEADER_BODY_LEN {
        cursor.skip((length - HEADER_BODY_LEN) as usize)?;
    }

    // A set high bit means SMPTE timecode rather than ticks per quarter note.
    if division == 0 || division & 0x8000 != 0 {
        return Err(ParseError::UnsupportedDivision(division));
    }

    debug!(format, track_count, division, "read MIDI header");
    Ok(Header {
        format,
        track_count,
        division,
    })
}

fn read_chunk(cursor: &mut ByteCursor<'_>, smf: &mut Smf) -> Result<(), ParseError> {
    let tag = cursor.read_ascii(4)?;
    let length = cursor.read_u32()? as usize;

    if tag == TRACK_TAG {
        let mut chunk = cursor.sub_cursor(length)?;
        let events = read_track(&mut chunk)?;
        debug!(
            track = smf.tracks.len(),
            events = events.len(),
            "decoded track chunk"
        );
        smf.tracks.push(events);
    } else {
        debug!(tag = %tag, length, "skipping unsupported chunk");
        cursor.skip(length)?;
        smf.skipped_chunks.push(tag);
    }
    Ok(())
}

fn read_track(chunk: &mut ByteCursor<'_>) -> Result<Vec<RawEvent>, ParseError> {
    let mut events = Vec::new();
    let mut ticks: u64 = 0;
    let mut running_status: Option<u8> = None;

    while !chunk.is_empty() {
        ticks += u64::from(chunk.read_var_len()?);

        let offset = chunk.position();
        let byte = chunk.peek_u8()?;
        let status = if byte & 0x80 != 0 {
            chunk.read_u8()?;
            byte
        } else {
            running_status.ok_or(ParseError::UnexpectedDataByte { offset, byte })?
        };

        let kind = match status {
            META => {
                running_status = None;
                read_meta(chunk)?
            }
            SYSEX | SYSEX_ESCAPE => {
                running_status = None;
                let length = chunk.read_var_len()? as usize;
                chunk.skip(length)?;
                None
            }
            0xF1..=0xFE => {
                running_status = None;
                chunk.skip(system_data_len(status))?;
                None
            }
            _ => {
                running_status = Some(status);
                read_channel_message(chunk, status)?
            }
        };

        if let Some(kind) = kind {
            events.push(RawEvent { ticks, kind });
        }
    }

    Ok(events)
}

/// Data bytes following a system common or realtime status.
fn system_data_len(status: u8) -> usize {
    match status {
        MTC_QUARTER_FRAME | SONG_SELECT => 1,
        SONG_POSITION => 2,
        _ => 0,
    }
}

fn read_meta(chunk: &mut ByteCursor<'_>) -> Result<Option<RawEventKind>, ParseError> {
    let meta_type = chunk.read_u8()?;
    let length = chunk.read_var_len()? as usize;
    let mut body = chunk.sub_cursor(length)?;

    Ok(match meta_type {
        META_TEMPO if length >= 3 => Some(RawEventKind::Tempo {
            microseconds_per_beat: body.read_u24()?,
        }),
        META_TEMPO => {
            debug!(length, "ignoring short tempo event");
            None
        }
        META_END_OF_TRACK => Some(RawEventKind::EndOfTrack),
        _ => None,
    })
}

fn read_channel_message(
    chunk: &mut ByteCursor<'_>,
    status: u8,
) -> Result<Option<RawEventKind>, ParseError> {
    let command = status & 0xF0;
    let channel = status & 0x0F;

    Ok(match command {
        NOTE_ON => {
            let note = chunk.read_u8()?;
            let velocity = chunk.read_u8()?;
            let message = if velocity == 0 {
                NoteMessage::off(channel, note, velocity)
            } else {
                NoteMessage::on(channel, note, velocity)
            };
            Some(RawEventKind::Note(message))
        }
        NOTE_OFF => {
            let note = chunk.read_u8()?;
            let velocity = chunk.read_u8()?;
            Some(RawEventKind::Note(NoteMessage::off(channel, note, velocity)))
        }
        PROGRAM_CHANGE | CHANNEL_PRESSURE => {
            chunk.skip(1)?;
            None
        }
        _ => {
            chunk.skip(2)?;
            None
        }
    })
}
