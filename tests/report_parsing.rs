// tests/report_parsing.rs
use incident_feed_sync::report::description::{parse_description, DescriptionParser};
use incident_feed_sync::report::identity::resolve_incident_key;
use incident_feed_sync::{EntryError, IncidentKey};

#[test]
fn rfs_guid_resolves_to_trailing_number() {
    assert_eq!(
        resolve_incident_key("tag:www.rfs.nsw.gov.au,2013-11-02:80707").unwrap(),
        IncidentKey(80707)
    );
}

#[test]
fn guid_without_trailing_number_is_rejected() {
    for bad in ["tag:www.rfs.nsw.gov.au,2013-11-02:", "tag:www.rfs.nsw.gov.au,2013-11-02:abc", "80707x", ""] {
        assert!(
            matches!(resolve_incident_key(bad), Err(EntryError::MalformedIdentifier(_))),
            "{bad:?} should not resolve"
        );
    }
}

#[test]
fn description_fields_become_attributes() {
    let attrs = parse_description(
        "ALERT LEVEL: Not Applicable<br />STATUS: under control<br />UPDATED: 5 Feb 2014 08:58",
    );
    let pairs: Vec<_> = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    assert_eq!(
        pairs,
        [
            ("alert_level", "Not Applicable"),
            ("status", "under control"),
            ("updated", "5 Feb 2014 08:58"),
        ]
    );
}

#[test]
fn updated_is_cut_before_trailing_markup() {
    let attrs = parse_description(
        "STATUS: out<br />UPDATED: 5 Feb 2014 08:58<a href='http://www.rfs.nsw.gov.au'>link</a>",
    );
    assert_eq!(attrs["updated"], "5 Feb 2014 08:58");
}

#[test]
fn custom_break_marker() {
    let attrs = DescriptionParser::new("\n").parse("FIRE: Yes\nSIZE: 12 ha\nsee website");
    assert_eq!(attrs["fire"], "Yes");
    assert_eq!(attrs["size"], "12 ha");
    assert_eq!(attrs["extra"], "see website");
}
