//! Textual SDP patches applied during loopback negotiation
//!
//! Both patches work line by line on `\r\n` terminated SDP and only touch
//! the video media section. Lines they do not target are passed through
//! byte for byte.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static MEDIA_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^m=(\S+) (\S+) (\S+)((?: \S+)*)$").expect("valid regex"));
static RTPMAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^a=rtpmap:(\d+) ([^/\s]+)/").expect("valid regex"));
static RTX_APT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^a=fmtp:(\d+) apt=(\d+)").expect("valid regex"));
static PAYLOAD_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^a=(?:rtpmap|fmtp|rtcp-fb):(\d+)[ \r]").expect("valid regex"));

/// SDP split into lines, each keeping its terminator
struct Lines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Lines<'a> {
    fn new(sdp: &'a str) -> Self {
        Self {
            lines: sdp.split_inclusive('\n').collect(),
        }
    }

    /// Index ranges of each `m=video` section, media line included
    fn video_sections(&self) -> Vec<std::ops::Range<usize>> {
        let mut sections = Vec::new();
        let mut start = None;
        for (i, line) in self.lines.iter().enumerate() {
            if line.starts_with("m=") {
                if let Some(s) = start.take() {
                    sections.push(s..i);
                }
                if line.starts_with("m=video ") {
                    start = Some(i);
                }
            }
        }
        if let Some(s) = start {
            sections.push(s..self.lines.len());
        }
        sections
    }
}

fn body(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

fn terminator(line: &str) -> &str {
    &line[body(line).len()..]
}

/// Strip RED, ULPFEC and their RTX payloads from every video section.
///
/// Removes the payload types from the `m=video` format list together with
/// their `a=rtpmap`, `a=fmtp` and `a=rtcp-fb` lines, e.g.
/// `a=rtpmap:116 red/90000`, `a=rtpmap:117 ulpfec/90000`,
/// `a=rtpmap:98 rtx/90000` and `a=fmtp:98 apt=116`.
pub fn remove_video_fec(sdp: &str) -> String {
    let lines = Lines::new(sdp);
    let mut drop_lines = HashSet::new();
    let mut rewritten = Vec::new();

    for section in lines.video_sections() {
        let section_lines = &lines.lines[section.clone()];

        let mut removed: HashSet<String> = section_lines
            .iter()
            .filter_map(|line| RTPMAP.captures(body(line)))
            .filter(|c| matches!(c[2].to_ascii_lowercase().as_str(), "red" | "ulpfec"))
            .map(|c| c[1].to_string())
            .collect();
        if removed.is_empty() {
            continue;
        }

        let rtx: Vec<String> = section_lines
            .iter()
            .filter_map(|line| RTX_APT.captures(body(line)))
            .filter(|c| removed.contains(&c[2]))
            .map(|c| c[1].to_string())
            .collect();
        removed.extend(rtx);

        for (offset, line) in section_lines.iter().enumerate() {
            let index = section.start + offset;
            if offset == 0 {
                if let Some(c) = MEDIA_LINE.captures(body(line)) {
                    let formats: Vec<&str> = c[4]
                        .split_whitespace()
                        .filter(|pt| !removed.contains(*pt))
                        .collect();
                    let mut media = format!("m={} {} {}", &c[1], &c[2], &c[3]);
                    for pt in formats {
                        media.push(' ');
                        media.push_str(pt);
                    }
                    media.push_str(terminator(line));
                    rewritten.push((index, media));
                }
            } else if let Some(c) = PAYLOAD_ATTR.captures(line) {
                if removed.contains(&c[1]) {
                    drop_lines.insert(index);
                }
            }
        }
    }

    let mut out = String::with_capacity(sdp.len());
    for (i, line) in lines.lines.iter().enumerate() {
        if drop_lines.contains(&i) {
            continue;
        }
        match rewritten.iter().find(|(index, _)| *index == i) {
            Some((_, media)) => out.push_str(media),
            None => out.push_str(line),
        }
    }
    out
}

/// Cap the video send bitrate by inserting `b=AS:<kbps>` right after the
/// `a=mid:` line of every video section (e.g. `a=mid:video`).
///
/// SDP without a video section is returned unchanged.
pub fn constrain_video_bitrate(sdp: &str, kbps: u32) -> String {
    let lines = Lines::new(sdp);
    let targets: HashSet<usize> = lines
        .video_sections()
        .into_iter()
        .filter_map(|mut section| section.find(|&i| lines.lines[i].starts_with("a=mid:")))
        .collect();

    if targets.is_empty() {
        return sdp.to_string();
    }

    let mut out = String::with_capacity(sdp.len() + 16 * targets.len());
    for (i, line) in lines.lines.iter().enumerate() {
        out.push_str(line);
        if targets.contains(&i) {
            let mut eol = terminator(line);
            if eol.is_empty() {
                eol = "\r\n";
                out.push_str(eol);
            }
            out.push_str(&format!("b=AS:{}{}", kbps, eol));
        }
    }
    out
}
