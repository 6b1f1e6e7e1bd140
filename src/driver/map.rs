//! Wire code bytes of the individual commands and responses

macro_rules! makecode {
    ($($name:ident, $val:literal),*) => {
        $(pub const $name: u8 = $val;)*
    };
}

// request codes keep the ASCII mnemonics of the MN command set where one
// exists; responses use their own letters since the two directions never mix
#[rustfmt::skip]
makecode!(
    MOVE, b'M',
    HOME, b'H',
    JOG, b'J',
    STOP, b'Q',
    GET_STATUS, b'S',
    SET_PARAMETER, b'P',
    IDENTIFY, b'?',
    ACK, b'A',
    NACK, b'N',
    STATUS_REPORT, b'T',
    FAULT, b'E',
    IDENTITY, b'I'
);
