#[macro_export]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Declares a fixed hardware resource (buffer, filter, mask) together with an
/// explicit index and register table for every variant.
#[macro_export]
macro_rules! resource_def {
    (
        $(#[doc = $doc:expr])*
        $name:ident($regs:ty) => {
            $(
                $(#[doc = $res_doc:expr])*
                $res:ident = $idx:literal => $table:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $res_doc])*
                $res,
            )*
        }

        impl $name {
            #[doc = concat!("All valid options for [`", stringify!($name), "`], in priority order.")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($res)),*])] = [$(Self::$res),*];

            #[doc = concat!("Hardware index of the [`", stringify!($name), "`].")]
            pub const fn index(self) -> usize {
                match self {
                    $(Self::$res => $idx,)*
                }
            }

            #[doc = concat!("Looks up a [`", stringify!($name), "`] by its hardware index.")]
            pub const fn from_index(index: usize) -> Option<Self> {
                match index {
                    $($idx => Some(Self::$res),)*
                    _ => None,
                }
            }

            #[doc = concat!("Registers backing this [`", stringify!($name), "`].")]
            pub const fn registers(self) -> $regs {
                match self {
                    $(Self::$res => $table,)*
                }
            }
        }
    };
}

// Logging shims. Each forwards to `defmt` and/or `log` depending on enabled
// features and expands to nothing when neither is enabled.

macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)+);
        #[cfg(feature = "log")]
        ::log::trace!($($arg)+);
    }};
}

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)+);
        #[cfg(feature = "log")]
        ::log::debug!($($arg)+);
    }};
}

macro_rules! warn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)+);
        #[cfg(feature = "log")]
        ::log::warn!($($arg)+);
    }};
}
