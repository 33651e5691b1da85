//! Enum fields of the wire command record (`spec.md` §3).
//!
//! Each enum serialises as its variant name and is parsed back via
//! [`std::str::FromStr`]; unrecognised names surface as
//! [`crate::Error::InvalidField`] rather than panicking.

use std::fmt;
use std::str::FromStr;

use crate::Error;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Returns the wire representation (the enum variant's name).
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

wire_enum! {
    /// `ac` — what a command asks the engine to do.
    #[derive(Default)]
    Action {
        #[default]
        invalid,
        send,
        file,
        data,
        end_data,
        receive,
        cancel,
        status,
        finish,
    }
}

wire_enum! {
    /// `zip` — payload compression applied to `data`.
    #[derive(Default)]
    Compression {
        #[default]
        none,
        zlib,
    }
}

wire_enum! {
    /// `ft` — what kind of filesystem entry a `file` command describes.
    #[derive(Default)]
    FileType {
        #[default]
        regular,
        directory,
        symlink,
        link,
    }
}

wire_enum! {
    /// `tt` — whether a regular file is transferred whole or as an rsync delta.
    #[derive(Default)]
    TransmissionType {
        #[default]
        simple,
        rsync,
    }
}

pub(crate) fn parse_enum<T: FromStr>(field: &'static str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::invalid(field, format!("unrecognised enum value {value:?}")))
}
