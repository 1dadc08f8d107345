#![no_main]

use libfuzzer_sys::fuzz_target;
use topicbot_commands::parse_command_text;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let tokens = raw.split_whitespace().collect::<Vec<_>>();
    let Some(parsed) = parse_command_text(&raw, "/oc") else {
        assert!(tokens
            .first()
            .map_or(true, |first| !first.eq_ignore_ascii_case("/oc")));
        return;
    };

    assert!(tokens[0].eq_ignore_ascii_case("/oc"));
    match tokens.get(1) {
        Some(subcommand) => {
            assert_eq!(parsed.subcommand, subcommand.to_ascii_lowercase());
            assert_eq!(parsed.args, tokens[2..]);
        }
        None => {
            assert_eq!(parsed.subcommand, "help");
            assert!(parsed.args.is_empty());
        }
    }
});
