//! Hangup cause codes and the per-signaling translation tables.
//!
//! [`Cause`] is the host runtime's vocabulary (Q.850 values plus a few
//! host-proprietary codes above 127). Each signaling variant owns a pair
//! of translations between that vocabulary and the hardware's fail
//! codes. The tables are deliberately asymmetric where the signaling is:
//! Mexico R2 forward-maps only Busy but funnels every outgoing cause to
//! Busy, and the reverse direction of every R2 country has a catch-all
//! fail code rather than an error path.

/// Hangup/failure reason in the host runtime's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Cause {
    UnallocatedNumber = 1,
    NoRouteTransitNet = 2,
    NoRouteDestination = 3,
    ChannelUnacceptable = 6,
    CallAwardedDelivered = 7,
    NormalClearing = 16,
    UserBusy = 17,
    NoUserResponse = 18,
    NoAnswer = 19,
    CallRejected = 21,
    NumberChanged = 22,
    DestinationOutOfOrder = 27,
    InvalidNumberFormat = 28,
    FacilityRejected = 29,
    NormalUnspecified = 31,
    NormalCircuitCongestion = 34,
    NetworkOutOfOrder = 38,
    SwitchCongestion = 42,
    RequestedChanUnavail = 44,
    FacilityNotSubscribed = 50,
    OutgoingCallBarred = 52,
    IncomingCallBarred = 54,
    ChanNotImplemented = 66,
    FacilityNotImplemented = 69,
    IncompatibleDestination = 88,
    Interworking = 127,
    // host-proprietary, outside the Q.850 range
    InvalidGateway = 608,
    GatewayDown = 609,
    InvalidUrl = 610,
    InvalidProfile = 611,
}

impl Cause {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Cause> {
        use Cause::*;
        Some(match code {
            1 => UnallocatedNumber,
            2 => NoRouteTransitNet,
            3 => NoRouteDestination,
            6 => ChannelUnacceptable,
            7 => CallAwardedDelivered,
            16 => NormalClearing,
            17 => UserBusy,
            18 => NoUserResponse,
            19 => NoAnswer,
            21 => CallRejected,
            22 => NumberChanged,
            27 => DestinationOutOfOrder,
            28 => InvalidNumberFormat,
            29 => FacilityRejected,
            31 => NormalUnspecified,
            34 => NormalCircuitCongestion,
            38 => NetworkOutOfOrder,
            42 => SwitchCongestion,
            44 => RequestedChanUnavail,
            50 => FacilityNotSubscribed,
            52 => OutgoingCallBarred,
            54 => IncomingCallBarred,
            66 => ChanNotImplemented,
            69 => FacilityNotImplemented,
            88 => IncompatibleDestination,
            127 => Interworking,
            608 => InvalidGateway,
            609 => GatewayDown,
            610 => InvalidUrl,
            611 => InvalidProfile,
            _ => return None,
        })
    }

    /// Every cause this crate defines, for exhaustive table tests.
    pub const ALL: &'static [Cause] = &[
        Cause::UnallocatedNumber,
        Cause::NoRouteTransitNet,
        Cause::NoRouteDestination,
        Cause::ChannelUnacceptable,
        Cause::CallAwardedDelivered,
        Cause::NormalClearing,
        Cause::UserBusy,
        Cause::NoUserResponse,
        Cause::NoAnswer,
        Cause::CallRejected,
        Cause::NumberChanged,
        Cause::DestinationOutOfOrder,
        Cause::InvalidNumberFormat,
        Cause::FacilityRejected,
        Cause::NormalUnspecified,
        Cause::NormalCircuitCongestion,
        Cause::NetworkOutOfOrder,
        Cause::SwitchCongestion,
        Cause::RequestedChanUnavail,
        Cause::FacilityNotSubscribed,
        Cause::OutgoingCallBarred,
        Cause::IncomingCallBarred,
        Cause::ChanNotImplemented,
        Cause::FacilityNotImplemented,
        Cause::IncompatibleDestination,
        Cause::Interworking,
        Cause::InvalidGateway,
        Cause::GatewayDown,
        Cause::InvalidUrl,
        Cause::InvalidProfile,
    ];
}

/// ISDN/Q.931: fail codes are Q.850 causes already.
pub mod isdn {
    use super::Cause;

    /// Q.931 "interworking, unspecified": the catch-all for anything our
    /// vocabulary carries that Q.850 does not.
    pub const Q931_INTERWORKING: i32 = 127;

    pub fn cause_from_call_fail(fail: i32) -> Cause {
        if fail <= 127 {
            Cause::from_code(fail).unwrap_or(Cause::UserBusy)
        } else {
            Cause::Interworking
        }
    }

    pub fn call_fail_from_cause(cause: Cause) -> i32 {
        let code = cause.code();
        if code <= 127 {
            code
        } else {
            Q931_INTERWORKING
        }
    }
}

/// R2/MFC: per-country group-B fail codes, asymmetric by design.
pub mod r2 {
    use serde::Deserialize;

    use super::Cause;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
    pub enum R2Country {
        Argentina,
        Brazil,
        Chile,
        Mexico,
        Uruguay,
        Venezuela,
    }

    /// Group-B signal codes per country, as the hardware numbers them.
    pub mod fail {
        pub mod argentina {
            pub const NUMBER_CHANGED: i32 = 0x02;
            pub const BUSY: i32 = 0x03;
            pub const CONGESTION: i32 = 0x04;
            pub const INVALID_NUMBER: i32 = 0x05;
            pub const LINE_OUT_OF_ORDER: i32 = 0x08;
        }
        pub mod brazil {
            pub const BUSY: i32 = 0x02;
            pub const NUMBER_CHANGED: i32 = 0x03;
            pub const CONGESTION: i32 = 0x04;
            pub const INVALID_NUMBER: i32 = 0x07;
            pub const LINE_OUT_OF_ORDER: i32 = 0x08;
        }
        pub mod chile {
            pub const NUMBER_CHANGED: i32 = 0x02;
            pub const BUSY: i32 = 0x03;
            pub const CONGESTION: i32 = 0x04;
            pub const INVALID_NUMBER: i32 = 0x05;
            pub const LINE_OUT_OF_ORDER: i32 = 0x08;
        }
        pub mod mexico {
            pub const BUSY: i32 = 0x02;
        }
        pub mod uruguay {
            pub const NUMBER_CHANGED: i32 = 0x02;
            pub const BUSY: i32 = 0x03;
            pub const CONGESTION: i32 = 0x04;
            pub const INVALID_NUMBER: i32 = 0x05;
            pub const LINE_OUT_OF_ORDER: i32 = 0x08;
        }
        pub mod venezuela {
            pub const NUMBER_CHANGED: i32 = 0x02;
            pub const BUSY: i32 = 0x03;
            pub const CONGESTION: i32 = 0x04;
            pub const LINE_BLOCKED: i32 = 0x08;
        }
    }

    /// Hardware fail code → host cause. Codes a country does not define
    /// fall back to `UserBusy`.
    pub fn cause_from_call_fail(country: R2Country, fail: i32) -> Cause {
        use self::fail as f;
        use Cause::*;
        use R2Country::*;

        match country {
            Argentina => match fail {
                x if x == f::argentina::BUSY => UserBusy,
                x if x == f::argentina::NUMBER_CHANGED => NumberChanged,
                x if x == f::argentina::CONGESTION => NormalCircuitCongestion,
                x if x == f::argentina::INVALID_NUMBER => UnallocatedNumber,
                x if x == f::argentina::LINE_OUT_OF_ORDER => RequestedChanUnavail,
                _ => UserBusy,
            },
            Brazil => match fail {
                x if x == f::brazil::BUSY => UserBusy,
                x if x == f::brazil::NUMBER_CHANGED => NumberChanged,
                x if x == f::brazil::CONGESTION => NormalCircuitCongestion,
                x if x == f::brazil::INVALID_NUMBER => UnallocatedNumber,
                x if x == f::brazil::LINE_OUT_OF_ORDER => RequestedChanUnavail,
                _ => UserBusy,
            },
            Chile => match fail {
                x if x == f::chile::BUSY => UserBusy,
                x if x == f::chile::NUMBER_CHANGED => NumberChanged,
                x if x == f::chile::CONGESTION => NormalCircuitCongestion,
                x if x == f::chile::INVALID_NUMBER => UnallocatedNumber,
                x if x == f::chile::LINE_OUT_OF_ORDER => RequestedChanUnavail,
                _ => UserBusy,
            },
            // Mexico's group-B vocabulary only signals busy
            Mexico => match fail {
                x if x == f::mexico::BUSY => UserBusy,
                _ => UserBusy,
            },
            Uruguay => match fail {
                x if x == f::uruguay::BUSY => UserBusy,
                x if x == f::uruguay::NUMBER_CHANGED => NumberChanged,
                x if x == f::uruguay::CONGESTION => NormalCircuitCongestion,
                x if x == f::uruguay::INVALID_NUMBER => UnallocatedNumber,
                x if x == f::uruguay::LINE_OUT_OF_ORDER => RequestedChanUnavail,
                _ => UserBusy,
            },
            Venezuela => match fail {
                x if x == f::venezuela::BUSY => UserBusy,
                x if x == f::venezuela::NUMBER_CHANGED => NumberChanged,
                x if x == f::venezuela::CONGESTION => NormalCircuitCongestion,
                x if x == f::venezuela::LINE_BLOCKED => OutgoingCallBarred,
                _ => UserBusy,
            },
        }
    }

    /// Host cause → hardware fail code. Every country has a catch-all
    /// signal, so this direction is total.
    pub fn call_fail_from_cause(country: R2Country, cause: Cause) -> i32 {
        use self::fail as f;
        use Cause::*;
        use R2Country::*;

        match country {
            Argentina => match cause {
                UnallocatedNumber | NoRouteTransitNet | NoRouteDestination
                | InvalidNumberFormat | InvalidGateway | InvalidUrl | FacilityNotSubscribed
                | IncompatibleDestination | IncomingCallBarred | OutgoingCallBarred => {
                    f::argentina::INVALID_NUMBER
                }
                UserBusy | NoUserResponse | CallRejected => f::argentina::BUSY,
                NumberChanged => f::argentina::NUMBER_CHANGED,
                NormalCircuitCongestion | SwitchCongestion | NormalClearing
                | NormalUnspecified | CallAwardedDelivered => f::argentina::CONGESTION,
                _ => f::argentina::LINE_OUT_OF_ORDER,
            },
            Brazil => match cause {
                UnallocatedNumber | NoRouteTransitNet | NoRouteDestination
                | InvalidNumberFormat | InvalidGateway | InvalidUrl | FacilityNotSubscribed
                | IncompatibleDestination | IncomingCallBarred | OutgoingCallBarred => {
                    f::brazil::INVALID_NUMBER
                }
                UserBusy | NoUserResponse | CallRejected => f::brazil::BUSY,
                NumberChanged => f::brazil::NUMBER_CHANGED,
                NormalCircuitCongestion | SwitchCongestion | NormalClearing
                | NormalUnspecified | CallAwardedDelivered => f::brazil::CONGESTION,
                _ => f::brazil::LINE_OUT_OF_ORDER,
            },
            Chile => match cause {
                UnallocatedNumber | NoRouteTransitNet | NoRouteDestination
                | InvalidNumberFormat | InvalidGateway | InvalidUrl | FacilityNotSubscribed
                | IncompatibleDestination | IncomingCallBarred | OutgoingCallBarred => {
                    f::chile::INVALID_NUMBER
                }
                UserBusy | NoUserResponse | CallRejected => f::chile::BUSY,
                NumberChanged => f::chile::NUMBER_CHANGED,
                NormalCircuitCongestion | SwitchCongestion | NormalClearing
                | NormalUnspecified | CallAwardedDelivered => f::chile::CONGESTION,
                _ => f::chile::LINE_OUT_OF_ORDER,
            },
            // every outgoing cause collapses to the one signal Mexico has
            Mexico => f::mexico::BUSY,
            Uruguay => match cause {
                UnallocatedNumber | NoRouteTransitNet | NoRouteDestination
                | InvalidNumberFormat | InvalidGateway | InvalidUrl | FacilityNotSubscribed
                | IncompatibleDestination | IncomingCallBarred | OutgoingCallBarred => {
                    f::uruguay::INVALID_NUMBER
                }
                UserBusy | NoUserResponse | CallRejected => f::uruguay::BUSY,
                NumberChanged => f::uruguay::NUMBER_CHANGED,
                NormalCircuitCongestion | SwitchCongestion | NormalClearing
                | NormalUnspecified | CallAwardedDelivered => f::uruguay::CONGESTION,
                _ => f::uruguay::LINE_OUT_OF_ORDER,
            },
            Venezuela => match cause {
                IncomingCallBarred | OutgoingCallBarred => f::venezuela::LINE_BLOCKED,
                NumberChanged => f::venezuela::NUMBER_CHANGED,
                NormalCircuitCongestion | SwitchCongestion | NormalClearing
                | NormalUnspecified | CallAwardedDelivered => f::venezuela::CONGESTION,
                _ => f::venezuela::BUSY,
            },
        }
    }
}

/// GSM: the radio module reports Q.850-aligned call causes.
pub mod gsm {
    use super::Cause;

    pub fn cause_from_call_fail(fail: i32) -> Cause {
        use Cause::*;
        match fail {
            1 => UnallocatedNumber,
            3 => NoRouteDestination,
            6 => ChannelUnacceptable,
            16 => NormalClearing,
            17 => UserBusy,
            18 => NoUserResponse,
            19 => NoAnswer,
            21 => CallRejected,
            22 => NumberChanged,
            27 => DestinationOutOfOrder,
            28 => InvalidNumberFormat,
            29 => FacilityRejected,
            31 => NormalUnspecified,
            34 => NormalCircuitCongestion,
            38 => NetworkOutOfOrder,
            42 => SwitchCongestion,
            44 => RequestedChanUnavail,
            50 => FacilityNotSubscribed,
            69 => FacilityNotImplemented,
            88 => IncompatibleDestination,
            127 => Interworking,
            _ => UserBusy,
        }
    }

    pub fn call_fail_from_cause(cause: Cause) -> i32 {
        use Cause::*;
        match cause {
            UnallocatedNumber => 1,
            NoRouteDestination => 3,
            ChannelUnacceptable => 6,
            NormalClearing => 16,
            UserBusy => 17,
            NoUserResponse => 18,
            NoAnswer => 19,
            CallRejected => 21,
            NumberChanged => 22,
            DestinationOutOfOrder => 27,
            InvalidNumberFormat => 28,
            FacilityRejected => 29,
            NormalUnspecified => 31,
            NormalCircuitCongestion => 34,
            NetworkOutOfOrder => 38,
            SwitchCongestion => 42,
            RequestedChanUnavail => 44,
            FacilityNotSubscribed => 50,
            FacilityNotImplemented => 69,
            IncompatibleDestination => 88,
            Interworking => 127,
            _ => -1,
        }
    }
}

/// Analog loop-start lines carry no fail vocabulary on the wire; both
/// directions use the documented defaults.
pub mod analog {
    use super::Cause;

    pub fn cause_from_call_fail(_fail: i32) -> Cause {
        Cause::UserBusy
    }

    pub fn call_fail_from_cause(_cause: Cause) -> i32 {
        -1
    }
}
