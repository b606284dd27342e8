use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::alphabet::Alphabet;
use crate::config::{TRIE_FILE_VERSION, TRIE_MAGIC};
use crate::error::DecodeError;

/// Vocabulary trie over alphabet token indices. Used as a hard filter
/// during beam expansion: a mid-word prefix may only be extended with
/// tokens that keep it the spelling prefix of some vocabulary word.
///
/// Node 0 is the root. Children are kept sorted by token so the
/// serialized form is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabTrie {
    nodes: Vec<TrieNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TrieNode {
    terminal: bool,
    children: Vec<(u32, u32)>,
}

impl VocabTrie {
    /// Builds a trie from vocabulary words, spelling each word with
    /// single-character alphabet entries. Words containing characters
    /// outside the alphabet are skipped.
    pub fn from_words<W: AsRef<str>>(words: &[W], alphabet: &Alphabet) -> Self {
        let mut trie = Self {
            nodes: vec![TrieNode::default()],
        };
        let mut skipped = 0usize;
        'words: for word in words {
            let mut spelled = Vec::new();
            for c in word.as_ref().chars() {
                match alphabet.index_of(&c.to_string()) {
                    Some(token) => spelled.push(token),
                    None => {
                        skipped += 1;
                        continue 'words;
                    }
                }
            }
            if !spelled.is_empty() {
                trie.insert(&spelled);
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "trie: skipped words not spellable in the alphabet");
        }
        trie
    }

    fn insert(&mut self, tokens: &[usize]) {
        let mut node = 0usize;
        for &token in tokens {
            let token = token as u32;
            node = match self.nodes[node].children.binary_search_by_key(&token, |c| c.0) {
                Ok(pos) => self.nodes[node].children[pos].1 as usize,
                Err(pos) => {
                    let next = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(pos, (token, next));
                    next as usize
                }
            };
        }
        self.nodes[node].terminal = true;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn descend(&self, path: &[usize]) -> Option<usize> {
        let mut node = 0usize;
        for &token in path {
            let token = token as u32;
            match self.nodes[node].children.binary_search_by_key(&token, |c| c.0) {
                Ok(pos) => node = self.nodes[node].children[pos].1 as usize,
                Err(_) => return None,
            }
        }
        Some(node)
    }

    /// True when `path` extended by `token` is still the prefix of some
    /// vocabulary word.
    pub fn accepts(&self, path: &[usize], token: usize) -> bool {
        let Some(node) = self.descend(path) else {
            return false;
        };
        self.nodes[node]
            .children
            .binary_search_by_key(&(token as u32), |c| c.0)
            .is_ok()
    }

    /// True when `path` spells a complete vocabulary word.
    pub fn is_word(&self, path: &[usize]) -> bool {
        self.descend(path)
            .map(|node| self.nodes[node].terminal)
            .unwrap_or(false)
    }

    pub fn save(&self, path: &Path) -> Result<(), DecodeError> {
        let file = File::create(path).map_err(|e| DecodeError::io("create trie file", e))?;
        let mut writer = BufWriter::new(file);
        let write = |writer: &mut BufWriter<File>, bytes: &[u8]| {
            writer
                .write_all(bytes)
                .map_err(|e| DecodeError::io("write trie file", e))
        };
        write(&mut writer, &TRIE_MAGIC)?;
        write(&mut writer, &TRIE_FILE_VERSION.to_le_bytes())?;
        write(&mut writer, &(self.nodes.len() as u32).to_le_bytes())?;
        for node in &self.nodes {
            write(&mut writer, &[node.terminal as u8])?;
            write(&mut writer, &(node.children.len() as u32).to_le_bytes())?;
            for &(token, child) in &node.children {
                write(&mut writer, &token.to_le_bytes())?;
                write(&mut writer, &child.to_le_bytes())?;
            }
        }
        writer
            .flush()
            .map_err(|e| DecodeError::io("write trie file", e))
    }

    pub fn load(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|e| DecodeError::io("open trie file", e))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        read_exact(&mut reader, &mut magic)?;
        if magic != TRIE_MAGIC {
            return Err(DecodeError::format(
                "load trie file",
                format!("bad magic {magic:?}"),
            ));
        }
        let version = read_u32(&mut reader)?;
        if version != TRIE_FILE_VERSION {
            return Err(DecodeError::format(
                "load trie file",
                format!("unsupported version {version}, expected {TRIE_FILE_VERSION}"),
            ));
        }

        let node_count = read_u32(&mut reader)? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let mut flag = [0u8; 1];
            read_exact(&mut reader, &mut flag)?;
            let child_count = read_u32(&mut reader)? as usize;
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let token = read_u32(&mut reader)?;
                let child = read_u32(&mut reader)?;
                if child as usize >= node_count {
                    return Err(DecodeError::format(
                        "load trie file",
                        format!("child index {child} out of range for {node_count} nodes"),
                    ));
                }
                children.push((token, child));
            }
            nodes.push(TrieNode {
                terminal: flag[0] != 0,
                children,
            });
        }
        if nodes.is_empty() {
            return Err(DecodeError::format("load trie file", "empty node table"));
        }
        tracing::debug!(nodes = nodes.len(), "trie: loaded vocabulary trie");
        Ok(Self { nodes })
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DecodeError> {
    reader
        .read_exact(buf)
        .map_err(|e| DecodeError::io("read trie file", e))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
