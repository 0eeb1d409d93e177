/// Nejdelší neúplný řádek, který buffer drží; delší se zahodí.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Sběrný buffer pro proud bajtů rozdělený na řádky znakem `\n`.
///
/// Neúplný konec zůstává v bufferu do dalšího čtení, nejvýše však `limit`
/// bajtů. Hledání oddělovače pokračuje tam, kde minule skončilo.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    scanned: usize,
    limit: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { buf: Vec::new(), scanned: 0, limit: limit.max(1), discarding: false }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Další celý řádek bez oddělovače.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                return None;
            };
            let mut line: Vec<u8> = self.buf.drain(..=self.scanned + offset).collect();
            self.scanned = 0;
            if self.discarding {
                // konec příliš dlouhého řádku
                self.discarding = false;
                continue;
            }
            line.pop();
            return Some(line);
        }
    }

    /// Pokud neúplný řádek přerostl limit, zahodí ho a vrátí zahozené bajty.
    /// Zbytek takového řádku až po `\n` se pak přeskočí. Pro jeden řádek
    /// vrací `Some` jen jednou.
    pub fn take_overflow(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() <= self.limit {
            return None;
        }
        let dropped = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let first = !self.discarding;
        self.discarding = true;
        first.then_some(dropped)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.discarding = false;
    }
}
