/// Block check character: running XOR over the protected telegram bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bcc(u8);

impl Bcc {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn digest(&mut self, b: u8) {
        self.0 ^= b;
    }

    pub fn digest_many(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.digest(*b);
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for Bcc {
    fn from(value: u8) -> Self {
        Self(value)
    }
}
