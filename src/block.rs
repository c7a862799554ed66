use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

const ROBOT_CHECK_MARKER: &str = "Robot Check";

static CAPTCHA_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)captcha").expect("captcha regex is valid"));

/// Which marker identified a response as an anti-automation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockSignal {
    RobotCheck,
    Captcha,
}

impl fmt::Display for BlockSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSignal::RobotCheck => write!(f, "robot check page"),
            BlockSignal::Captcha => write!(f, "captcha challenge"),
        }
    }
}

/// Looks for block markers in a 200 body. Any mention of "captcha" counts,
/// so an ordinary page that happens to contain the word is rejected too.
pub fn detect_block(body: &str) -> Option<BlockSignal> {
    if body.contains(ROBOT_CHECK_MARKER) {
        return Some(BlockSignal::RobotCheck);
    }

    CAPTCHA_MARKER
        .is_match(body)
        .then_some(BlockSignal::Captcha)
}

pub fn is_blocked(body: &str) -> bool {
    detect_block(body).is_some()
}
