use proptest::prelude::*;
use protocol::{Action, Compression, FileTransferCommand, FileType, TransmissionType};

fn arb_plain_string() -> impl Strategy<Value = String> {
    // Printable ASCII plus literal `;` so the escaping path is exercised.
    proptest::collection::vec(proptest::char::range(' ', '~'), 0..24)
        .prop_map(|chars| chars.into_iter().collect())
}

fn arb_command() -> impl Strategy<Value = FileTransferCommand> {
    (
        prop_oneof![
            Just(Action::send),
            Just(Action::file),
            Just(Action::data),
            Just(Action::end_data),
            Just(Action::receive),
            Just(Action::cancel),
            Just(Action::status),
            Just(Action::finish),
        ],
        prop_oneof![Just(Compression::none), Just(Compression::zlib)],
        prop_oneof![
            Just(FileType::regular),
            Just(FileType::directory),
            Just(FileType::symlink),
            Just(FileType::link),
        ],
        prop_oneof![Just(TransmissionType::simple), Just(TransmissionType::rsync)],
        arb_plain_string(),
        arb_plain_string(),
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        ".*",
        ".*",
        arb_plain_string(),
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(
            |(
                action,
                compression,
                ftype,
                ttype,
                id,
                file_id,
                quiet,
                mtime,
                permissions,
                size,
                name,
                status,
                parent,
                data,
            )| FileTransferCommand {
                action,
                compression,
                ftype,
                ttype,
                id,
                file_id,
                bypass: String::new(),
                quiet,
                mtime,
                permissions,
                size,
                name,
                status,
                parent,
                data,
            },
        )
}

proptest! {
    #[test]
    fn deserialize_of_serialize_is_identity(cmd in arb_command()) {
        let wire = cmd.serialize(false);
        let parsed = FileTransferCommand::deserialize(&wire).expect("round trip parses");
        prop_assert_eq!(parsed, cmd);
    }
}

#[test]
fn default_valued_fields_other_than_action_are_omitted() {
    let cmd = FileTransferCommand {
        action: Action::cancel,
        ..Default::default()
    };
    assert_eq!(cmd.serialize(false), "ac=cancel");
}
