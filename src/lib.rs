pub mod core;
pub mod storage;
pub mod trie;
pub mod search;
pub mod index;

/*
┌──────────────────────────────── FUZZDEX LAYOUT ────────────────────────────────┐
│                                                                                │
│  struct Store                      <store>/format, info, .lock                 │
│  • index: RwLock<Index>            exclusive insert, shared search             │
│  • query_cache: Option<QueryCache>                                             │
│        │                                                                       │
│        ▼                                                                       │
│  struct Index                      <store>/index/                              │
│  • forward: Trie   ──► fwd/        keys + 0xFF                                 │
│  • reverse: Trie   ──► rev/        reversed keys + 0xFF                        │
│        │                                                                       │
│        ▼                                                                       │
│  struct Trie                       0000, 0001, ..., HEAD ("part:handle")       │
│  • parts: RwLock<HashMap<PartId, Arc<Part>>>                                   │
│  • head: NodeLoc                                                               │
│        │                                                                       │
│        ▼                                                                       │
│  struct Part  (memmap2)                                                        │
│  [ PartHeader 256B | slot | block | slot | block | ... ]                       │
│    NodeHandle = slot offset, Node record = bincode(Vec<Child>)                 │
│    Child { label, target: Local(handle) | External{part, handle} | leaf }      │
│                                                                                │
│  FuzzyProcessor + Context: bit-parallel rows R[0..=k] fed one byte at a time   │
└────────────────────────────────────────────────────────────────────────────────┘
*/
