//! Timezone resolution.
//!
//! Candidate names are rewritten through a static table of legacy and link
//! names before being looked up in the tz database.

use chrono_tz::Tz;
use lazy_static::lazy_static;
use std::collections::HashMap;
use tracing::{debug, warn};

const TIMEZONE_ALIASES: &[(&str, &str)] = &[
    // North America
    ("America/Indianapolis", "America/Indiana/Indianapolis"),
    ("America/Fort_Wayne", "America/Indiana/Indianapolis"),
    ("America/Knox_IN", "America/Indiana/Knox"),
    ("America/Louisville", "America/Kentucky/Louisville"),
    ("America/Montreal", "America/Toronto"),
    ("America/Shiprock", "America/Denver"),
    ("America/Virgin", "America/Puerto_Rico"),
    ("America/Santa_Isabel", "America/Tijuana"),
    ("America/Ensenada", "America/Tijuana"),
    ("America/Rosario", "America/Argentina/Cordoba"),
    ("America/Cordoba", "America/Argentina/Cordoba"),
    ("America/Jujuy", "America/Argentina/Jujuy"),
    ("America/Mendoza", "America/Argentina/Mendoza"),
    ("America/Catamarca", "America/Argentina/Catamarca"),
    ("America/Buenos_Aires", "America/Argentina/Buenos_Aires"),
    ("America/Coral_Harbour", "America/Atikokan"),
    ("America/Atka", "America/Adak"),
    ("US/Alaska", "America/Anchorage"),
    ("US/Aleutian", "America/Adak"),
    ("US/Arizona", "America/Phoenix"),
    ("US/Central", "America/Chicago"),
    ("US/Eastern", "America/New_York"),
    ("US/East-Indiana", "America/Indiana/Indianapolis"),
    ("US/Hawaii", "Pacific/Honolulu"),
    ("US/Indiana-Starke", "America/Indiana/Knox"),
    ("US/Michigan", "America/Detroit"),
    ("US/Mountain", "America/Denver"),
    ("US/Pacific", "America/Los_Angeles"),
    ("US/Samoa", "Pacific/Pago_Pago"),
    ("Canada/Atlantic", "America/Halifax"),
    ("Canada/Central", "America/Winnipeg"),
    ("Canada/Eastern", "America/Toronto"),
    ("Canada/Mountain", "America/Edmonton"),
    ("Canada/Newfoundland", "America/St_Johns"),
    ("Canada/Pacific", "America/Vancouver"),
    // Asia
    ("Asia/Calcutta", "Asia/Kolkata"),
    ("Asia/Saigon", "Asia/Ho_Chi_Minh"),
    ("Asia/Katmandu", "Asia/Kathmandu"),
    ("Asia/Rangoon", "Asia/Yangon"),
    ("Asia/Ulan_Bator", "Asia/Ulaanbaatar"),
    ("Asia/Macao", "Asia/Macau"),
    ("Asia/Tel_Aviv", "Asia/Jerusalem"),
    ("Asia/Ashkhabad", "Asia/Ashgabat"),
    ("Asia/Chungking", "Asia/Chongqing"),
    ("Asia/Dacca", "Asia/Dhaka"),
    ("Asia/Istanbul", "Europe/Istanbul"),
    ("Asia/Kashgar", "Asia/Urumqi"),
    ("Asia/Thimbu", "Asia/Thimphu"),
    ("Asia/Ujung_Pandang", "Asia/Makassar"),
    ("ROC", "Asia/Taipei"),
    ("PRC", "Asia/Shanghai"),
    ("ROK", "Asia/Seoul"),
    ("Iran", "Asia/Tehran"),
    ("Israel", "Asia/Jerusalem"),
    ("Japan", "Asia/Tokyo"),
    ("Singapore", "Asia/Singapore"),
    ("Hongkong", "Asia/Hong_Kong"),
    // Europe
    ("Europe/Kiev", "Europe/Kyiv"),
    ("Europe/Belfast", "Europe/London"),
    ("Europe/Tiraspol", "Europe/Chisinau"),
    ("Europe/Nicosia", "Asia/Nicosia"),
    ("W-SU", "Europe/Moscow"),
    ("GB", "Europe/London"),
    ("GB-Eire", "Europe/London"),
    ("Eire", "Europe/Dublin"),
    ("Poland", "Europe/Warsaw"),
    ("Portugal", "Europe/Lisbon"),
    ("Turkey", "Europe/Istanbul"),
    // Australia and Pacific
    ("Australia/ACT", "Australia/Sydney"),
    ("Australia/Canberra", "Australia/Sydney"),
    ("Australia/NSW", "Australia/Sydney"),
    ("Australia/LHI", "Australia/Lord_Howe"),
    ("Australia/North", "Australia/Darwin"),
    ("Australia/Queensland", "Australia/Brisbane"),
    ("Australia/South", "Australia/Adelaide"),
    ("Australia/Tasmania", "Australia/Hobart"),
    ("Australia/Victoria", "Australia/Melbourne"),
    ("Australia/West", "Australia/Perth"),
    ("Australia/Yancowinna", "Australia/Broken_Hill"),
    ("Pacific/Samoa", "Pacific/Pago_Pago"),
    ("Pacific/Yap", "Pacific/Chuuk"),
    ("Pacific/Truk", "Pacific/Chuuk"),
    ("Pacific/Ponape", "Pacific/Pohnpei"),
    ("NZ", "Pacific/Auckland"),
    ("NZ-CHAT", "Pacific/Chatham"),
    // Africa
    ("Africa/Asmera", "Africa/Asmara"),
    ("Africa/Timbuktu", "Africa/Bamako"),
    ("Egypt", "Africa/Cairo"),
    ("Libya", "Africa/Tripoli"),
    // Atlantic
    ("Atlantic/Faeroe", "Atlantic/Faroe"),
    ("Atlantic/Jan_Mayen", "Europe/Oslo"),
    ("Iceland", "Atlantic/Reykjavik"),
    // UTC spellings
    ("Etc/UTC", "UTC"),
    ("Etc/GMT", "UTC"),
    ("GMT", "UTC"),
    ("Zulu", "UTC"),
    ("Universal", "UTC"),
];

lazy_static! {
    static ref ALIAS_MAP: HashMap<&'static str, &'static str> =
        TIMEZONE_ALIASES.iter().copied().collect();
}

/// Rewrite a legacy or link zone name to its canonical identifier.
pub fn canonical_timezone_name(name: &str) -> &str {
    ALIAS_MAP.get(name).copied().unwrap_or(name)
}

/// Parse a zone name, going through the alias table first.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    canonical_timezone_name(name).parse::<Tz>().ok()
}

/// Candidate timezone names, from the highest to the lowest priority
/// (after `forced`, each is used only when the previous ones are missing or
/// unparseable).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimezoneSources<'a> {
    /// Operator override from configuration.
    pub forced: Option<&'a str>,
    /// Timezone supplied with the request.
    pub requested: Option<&'a str>,
    /// Previously stored preference.
    pub stored: Option<&'a str>,
}

pub fn resolve_timezone(sources: &TimezoneSources<'_>, fallback: Tz) -> Tz {
    let candidates = [
        ("forced", sources.forced),
        ("requested", sources.requested),
        ("stored", sources.stored),
    ];
    for (origin, candidate) in candidates {
        let Some(name) = candidate else {
            continue;
        };
        match parse_timezone(name) {
            Some(tz) => {
                debug!("Using {} timezone {}", origin, tz.name());
                return tz;
            }
            None => warn!("Ignoring unknown {} timezone '{}'", origin, name),
        }
    }
    fallback
}
