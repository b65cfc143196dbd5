//! Salsa20 stream cipher with 16-byte keys
//!
//! Encrypted BLTE blocks use Salsa20/20 keyed with 128 bits ("expand 16-byte k"
//! constants, key repeated in both key slots) and an 8-byte nonce. The caller
//! derives the nonce from the block IV; see [`block_nonce`].

/// Salsa20 keystream generator
pub struct Salsa20Cipher {
    state: [u32; 16],
    keystream: [u8; 64],
    keystream_pos: usize,
}

impl Salsa20Cipher {
    /// Create a cipher from a 16-byte key and an 8-byte nonce
    pub fn new(key: &[u8; 16], nonce: &[u8; 8]) -> Self {
        let word = |bytes: &[u8]| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        let mut state = [0u32; 16];

        // "expand 16-byte k"
        state[0] = 0x6170_7865;
        state[5] = 0x3120_646e;
        state[10] = 0x7962_2d36;
        state[15] = 0x6b20_6574;

        for i in 0..4 {
            let k = word(&key[i * 4..]);
            state[1 + i] = k;
            state[11 + i] = k;
        }

        state[6] = word(&nonce[..4]);
        state[7] = word(&nonce[4..]);

        Self {
            state,
            keystream: [0; 64],
            keystream_pos: 64,
        }
    }

    fn generate_keystream(&mut self) {
        let mut working = self.state;

        for _ in 0..10 {
            // Column round
            Self::quarter_round(&mut working, 0, 4, 8, 12);
            Self::quarter_round(&mut working, 5, 9, 13, 1);
            Self::quarter_round(&mut working, 10, 14, 2, 6);
            Self::quarter_round(&mut working, 15, 3, 7, 11);

            // Row round
            Self::quarter_round(&mut working, 0, 1, 2, 3);
            Self::quarter_round(&mut working, 5, 6, 7, 4);
            Self::quarter_round(&mut working, 10, 11, 8, 9);
            Self::quarter_round(&mut working, 15, 12, 13, 14);
        }

        for (i, (out, input)) in working.iter().zip(self.state.iter()).enumerate() {
            let bytes = out.wrapping_add(*input).to_le_bytes();
            self.keystream[i * 4..(i + 1) * 4].copy_from_slice(&bytes);
        }

        // 64-bit block counter in words 8 and 9
        self.state[8] = self.state[8].wrapping_add(1);
        if self.state[8] == 0 {
            self.state[9] = self.state[9].wrapping_add(1);
        }

        self.keystream_pos = 0;
    }

    fn quarter_round(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
        state[b] ^= state[a].wrapping_add(state[d]).rotate_left(7);
        state[c] ^= state[b].wrapping_add(state[a]).rotate_left(9);
        state[d] ^= state[c].wrapping_add(state[b]).rotate_left(13);
        state[a] ^= state[d].wrapping_add(state[c]).rotate_left(18);
    }

    /// XOR the keystream into `data` in place (encrypts or decrypts)
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.keystream_pos >= 64 {
                self.generate_keystream();
            }
            *byte ^= self.keystream[self.keystream_pos];
            self.keystream_pos += 1;
        }
    }
}

/// Derive the per-block nonce from a block IV and the block's chunk index
///
/// The IV is zero-padded (or truncated) to 8 bytes and its low 4 bytes are
/// XORed with the little-endian chunk index.
pub fn block_nonce(iv: &[u8], chunk_index: usize) -> [u8; 8] {
    let mut nonce = [0u8; 8];
    let len = iv.len().min(8);
    nonce[..len].copy_from_slice(&iv[..len]);

    let index = (chunk_index as u32).to_le_bytes();
    for (n, i) in nonce.iter_mut().zip(index) {
        *n ^= i;
    }
    nonce
}

/// Decrypt `data` with the given key and nonce
pub fn decrypt_salsa20(data: &[u8], key: &[u8; 16], nonce: &[u8; 8]) -> Vec<u8> {
    let mut cipher = Salsa20Cipher::new(key, nonce);
    let mut output = data.to_vec();
    cipher.apply_keystream(&mut output);
    output
}

/// Encrypt `data`; identical to decryption for a stream cipher
pub fn encrypt_salsa20(data: &[u8], key: &[u8; 16], nonce: &[u8; 8]) -> Vec<u8> {
    decrypt_salsa20(data, key, nonce)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_salsa20_known_keystream() {
        // 128-bit key 80 00 .. 00, zero nonce
        let mut key = [0u8; 16];
        key[0] = 0x80;
        let stream = encrypt_salsa20(&[0u8; 16], &key, &[0u8; 8]);
        assert_eq!(
            hex::encode_upper(stream),
            "4DFA5E481DA23EA09A31022050859936"
        );
    }

    #[test]
    fn test_salsa20_round_trip() {
        let key = [0x01u8; 16];
        let nonce = block_nonce(&[0x02, 0x03, 0x04, 0x05], 0);
        let plaintext = b"Hello, World! This is a test message that spans more than one block of keystream output.";

        let ciphertext = encrypt_salsa20(plaintext, &key, &nonce);
        assert_ne!(&ciphertext[..], plaintext);

        let decrypted = decrypt_salsa20(&ciphertext, &key, &nonce);
        assert_eq!(&decrypted[..], plaintext);
    }

    #[test]
    fn test_chunked_apply_matches_one_shot() {
        let key = [0x5Au8; 16];
        let nonce = [9u8; 8];
        let data = vec![0xA5u8; 200];

        let one_shot = encrypt_salsa20(&data, &key, &nonce);

        let mut cipher = Salsa20Cipher::new(&key, &nonce);
        let mut pieces = data.clone();
        let (left, right) = pieces.split_at_mut(70);
        cipher.apply_keystream(left);
        cipher.apply_keystream(right);

        assert_eq!(one_shot, pieces);
    }

    #[test]
    fn test_block_nonce_perturbation() {
        let iv = [0x11, 0x22, 0x33, 0x44];
        assert_eq!(block_nonce(&iv, 0), [0x11, 0x22, 0x33, 0x44, 0, 0, 0, 0]);
        assert_eq!(block_nonce(&iv, 1), [0x10, 0x22, 0x33, 0x44, 0, 0, 0, 0]);
        assert_eq!(
            block_nonce(&iv, 0x0102),
            [0x13, 0x23, 0x33, 0x44, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_block_nonce_long_iv_truncated() {
        let iv: Vec<u8> = (1..=16).collect();
        assert_eq!(block_nonce(&iv, 0), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_different_chunks_encrypt_differently() {
        let key = [0x42u8; 16];
        let iv = [0x11, 0x22, 0x33, 0x44];
        let plaintext = b"Test data";

        let first = encrypt_salsa20(plaintext, &key, &block_nonce(&iv, 0));
        let second = encrypt_salsa20(plaintext, &key, &block_nonce(&iv, 1));
        assert_ne!(first, second);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decrypt_inverts_encrypt(
                data in prop::collection::vec(any::<u8>(), 0..1024),
                key in any::<[u8; 16]>(),
                iv in any::<[u8; 4]>(),
                chunk in 0usize..4096,
            ) {
                let nonce = block_nonce(&iv, chunk);
                let ciphertext = encrypt_salsa20(&data, &key, &nonce);
                prop_assert_eq!(ciphertext.len(), data.len());
                prop_assert_eq!(decrypt_salsa20(&ciphertext, &key, &nonce), data);
            }
        }
    }
}
