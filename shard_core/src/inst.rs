//! Machine-Level Instruction Model
//!
//! Instructions at this stage are fully lowered: opcodes are final,
//! operands name physical storage (byte ranges in the flat GRF file or
//! one of the special architectural registers), and execution width is
//! fixed. The scheduler treats instructions as immutable payloads that
//! it is only allowed to relocate, pair, or flag as atomic-issue.
//!
//! # Storage Model
//!
//! Every operand resolves to a [`StorageBase`]: a contiguous byte range
//! in the general register file, a special architectural register, or
//! the null register (not tracked for dependencies). An [`AccessMask`]
//! narrows the touched bytes within that range, which is what makes
//! partial-overwrite kill analysis possible during dependency
//! construction.

use smallvec::SmallVec;

// =============================================================================
// Math Function
// =============================================================================

/// Sub-function selector for the extended math pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFn {
    /// Reciprocal.
    Inv,
    /// Square root.
    Sqrt,
    /// Reciprocal square root.
    Rsqrt,
    /// Base-2 logarithm.
    Log,
    /// Base-2 exponent.
    Exp,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Power.
    Pow,
    /// Full-precision floating divide.
    Fdiv,
}

impl MathFn {
    /// Whether this function runs the long (two-pass) math sequence.
    #[inline]
    pub const fn is_long(self) -> bool {
        matches!(self, MathFn::Pow | MathFn::Fdiv)
    }
}

// =============================================================================
// Opcode
// =============================================================================

/// Machine opcode after lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Register move.
    Mov,
    /// Predicated select.
    Sel,
    /// Addition.
    Add,
    /// Multiplication.
    Mul,
    /// Multiply-accumulate.
    Mad,
    /// Systolic dot-product accumulate.
    Dpas,
    /// Extended math (transcendentals, divides).
    Math(MathFn),
    /// Message to a shared function (memory, sampler, URB, ...).
    Send,
    /// Block label. Always the first instruction when present.
    Label,
    /// Conditional or unconditional branch out of the block.
    Branch,
    /// Control-flow join point.
    Join,
    /// No-operation filler.
    Nop,
}

impl Opcode {
    /// Move-class opcodes eligible for write combining.
    #[inline]
    pub const fn is_mov_like(self) -> bool {
        matches!(self, Opcode::Mov | Opcode::Sel)
    }

    /// Multiply-accumulate class, eligible for operand read suppression.
    #[inline]
    pub const fn is_mad_like(self) -> bool {
        matches!(self, Opcode::Mad | Opcode::Dpas)
    }

    /// Control-transfer opcodes. These order against everything.
    #[inline]
    pub const fn is_control_flow(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::Join)
    }
}

// =============================================================================
// Architectural Registers
// =============================================================================

/// Special architectural registers outside the general register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchReg {
    /// Accumulator.
    Acc,
    /// Flag register 0 (predication / condition modifiers).
    Flag0,
    /// Flag register 1.
    Flag1,
    /// Address register used by indirect operands.
    Addr,
    /// One of the scalar registers.
    Scalar(u8),
}

// =============================================================================
// Storage Base
// =============================================================================

/// The physical storage location an operand resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageBase {
    /// A contiguous byte range within the flat general register file.
    Grf {
        /// First byte touched, linearized across the register file.
        byte_start: u32,
        /// Number of bytes in the range.
        byte_len: u32,
    },
    /// A special architectural register.
    Arch(ArchReg),
    /// The null register. Reads and writes are not tracked.
    Null,
}

impl StorageBase {
    /// Inclusive last byte of a GRF range, if this is a GRF base.
    #[inline]
    pub fn grf_end(&self) -> Option<u32> {
        match *self {
            StorageBase::Grf { byte_start, byte_len } => {
                Some(byte_start + byte_len.saturating_sub(1))
            }
            _ => None,
        }
    }

    /// Whether this base names the general register file.
    #[inline]
    pub const fn is_grf(&self) -> bool {
        matches!(self, StorageBase::Grf { .. })
    }
}

// =============================================================================
// Access Mask
// =============================================================================

/// Linearized byte bounds of one access, plus a stride flag.
///
/// A non-contiguous access (strided region) touches only some bytes in
/// `[left, right]` and therefore can never fully overwrite a live range,
/// no matter its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMask {
    /// First byte touched (inclusive).
    pub left: u32,
    /// Last byte touched (inclusive).
    pub right: u32,
    /// True when the access skips bytes inside its bounds.
    pub non_contiguous: bool,
}

impl AccessMask {
    /// Create a mask covering `[left, right]`.
    #[inline]
    pub const fn new(left: u32, right: u32, non_contiguous: bool) -> Self {
        AccessMask { left, right, non_contiguous }
    }

    /// A mask that overlaps everything and kills nothing. Used for
    /// conservative tracking (send channels, aliased targets).
    #[inline]
    pub const fn conservative() -> Self {
        AccessMask { left: 0, right: u32::MAX, non_contiguous: true }
    }

    /// Whether this access fully overwrites the byte span
    /// `[span_start, span_end]`.
    #[inline]
    pub fn covers_span(&self, span_start: u32, span_end: u32) -> bool {
        !self.non_contiguous && self.left <= span_start && self.right >= span_end
    }

    /// Whether this access fully overwrites `other`'s bytes.
    #[inline]
    pub fn kills(&self, other: &AccessMask) -> bool {
        !self.non_contiguous && self.left <= other.left && self.right >= other.right
    }

    /// Whether the two accesses touch at least one common byte.
    #[inline]
    pub fn overlaps(&self, other: &AccessMask) -> bool {
        self.left <= other.right && other.left <= self.right
    }
}

// =============================================================================
// Operand Role
// =============================================================================

/// Position an operand occupies within its instruction. The role pair of
/// two conflicting accesses decides the dependency kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandRole {
    /// Destination.
    Dst,
    /// Explicit source `n`.
    Src(u8),
    /// Predicate read.
    Pred,
    /// Condition-modifier write.
    CondMod,
    /// Implicit accumulator read.
    AccSrc,
    /// Implicit accumulator write.
    AccDst,
}

impl OperandRole {
    /// Whether this role writes its storage.
    #[inline]
    pub const fn is_write(self) -> bool {
        matches!(self, OperandRole::Dst | OperandRole::CondMod | OperandRole::AccDst)
    }
}

// =============================================================================
// Operand
// =============================================================================

/// One operand of a lowered instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    /// Resolved storage location.
    pub base: StorageBase,
    /// Bytes touched within the storage.
    pub mask: AccessMask,
    /// True when the actual target is computed through the address
    /// register and `base` is only the syntactic anchor.
    pub indirect: bool,
}

impl Operand {
    /// A direct GRF operand covering `byte_len` bytes at `byte_start`.
    pub fn grf(byte_start: u32, byte_len: u32) -> Self {
        Operand {
            base: StorageBase::Grf { byte_start, byte_len },
            mask: AccessMask::new(byte_start, byte_start + byte_len.saturating_sub(1), false),
            indirect: false,
        }
    }

    /// A strided GRF operand: same bounds, but not fully covering them.
    pub fn grf_strided(byte_start: u32, byte_len: u32) -> Self {
        let mut op = Self::grf(byte_start, byte_len);
        op.mask.non_contiguous = true;
        op
    }

    /// An architectural register operand.
    pub fn arch(reg: ArchReg) -> Self {
        Operand {
            base: StorageBase::Arch(reg),
            mask: AccessMask::conservative(),
            indirect: false,
        }
    }

    /// Mark this operand as indirectly addressed.
    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }
}

// =============================================================================
// Send Descriptors
// =============================================================================

/// Shared-function unit a send message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendTarget {
    /// Texture sampler.
    Sampler,
    /// Data cache (untyped / typed surface access).
    DataCache,
    /// Render target cache.
    RenderCache,
    /// Unified return buffer.
    Urb {
        /// Write offset in 16-byte units.
        offset: u32,
        /// Payload length in registers.
        len: u32,
    },
    /// Scratch-space block access.
    Scratch {
        /// Byte offset within scratch space.
        offset: u32,
        /// Bytes accessed.
        len: u32,
    },
}

impl SendTarget {
    /// Whether two messages may refer to the same memory. Different
    /// units never alias; two scratch accesses alias only when their
    /// ranges overlap.
    pub fn may_alias(&self, other: &SendTarget) -> bool {
        match (self, other) {
            (
                SendTarget::Scratch { offset: a, len: al },
                SendTarget::Scratch { offset: b, len: bl },
            ) => *a < *b + *bl && *b < *a + *al,
            (SendTarget::Urb { .. }, SendTarget::Urb { .. }) => true,
            (a, b) => core::mem::discriminant(a) == core::mem::discriminant(b),
        }
    }
}

/// Direction of a send message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendOp {
    /// Load-style message with a register response.
    Read,
    /// Store-style message.
    Write,
    /// Read-modify-write message.
    Atomic,
}

/// Message descriptor attached to [`Opcode::Send`] instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendDesc {
    /// Destination unit.
    pub target: SendTarget,
    /// Message direction.
    pub op: SendOp,
    /// True for memory fences. Fences are scheduling barriers.
    pub fence: bool,
    /// SIMD channel offset of this message (quadrant for split writes).
    pub mask_offset: u8,
}

impl SendDesc {
    /// Outstanding-request queue a message of this descriptor occupies.
    #[inline]
    pub fn queue_class(&self) -> SendQueueClass {
        match self.target {
            SendTarget::Sampler => SendQueueClass::Sampler,
            _ => SendQueueClass::Memory,
        }
    }

    /// Whether the message has a long, queued completion latency.
    #[inline]
    pub fn is_long_latency(&self) -> bool {
        !matches!(self.target, SendTarget::Urb { .. })
    }
}

/// Request classes with independently modeled queue depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendQueueClass {
    /// Sampler messages.
    Sampler,
    /// All other long-latency memory messages.
    Memory,
}

// =============================================================================
// Execution Pipe
// =============================================================================

/// Issue pipe an instruction occupies in the execution-unit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipe {
    /// Main ALU pipe.
    Alu,
    /// Extended math pipe.
    Math,
    /// Message/send pipe.
    Send,
    /// Control pipe (branches, labels, nops).
    Ctrl,
}

impl Pipe {
    /// Stable index for per-pipe bookkeeping arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Pipe::Alu => 0,
            Pipe::Math => 1,
            Pipe::Send => 2,
            Pipe::Ctrl => 3,
        }
    }

    /// Number of modeled pipes.
    pub const COUNT: usize = 4;
}

// =============================================================================
// Barrier Classification
// =============================================================================

/// How an instruction constrains scheduling beyond its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// Ordinary instruction; only operand dependencies apply.
    None,
    /// Block label.
    Label,
    /// Control transfer.
    Control,
    /// Memory fence.
    Fence,
    /// Unresolvable indirect access; conservatively a full barrier.
    Indirect,
}

impl BarrierKind {
    /// Whether any ordering constraint applies.
    #[inline]
    pub const fn is_barrier(self) -> bool {
        !matches!(self, BarrierKind::None)
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// A fully lowered machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    exec_size: u8,
    dst: Option<Operand>,
    srcs: SmallVec<[Operand; 3]>,
    pred: Option<Operand>,
    cond_mod: Option<Operand>,
    acc_src: Option<Operand>,
    acc_dst: Option<Operand>,
    send: Option<SendDesc>,
    atomic: bool,
    local_id: u32,
}

impl Instruction {
    /// Create an instruction with no operands yet.
    pub fn new(opcode: Opcode, exec_size: u8) -> Self {
        Instruction {
            opcode,
            exec_size,
            dst: None,
            srcs: SmallVec::new(),
            pred: None,
            cond_mod: None,
            acc_src: None,
            acc_dst: None,
            send: None,
            atomic: false,
            local_id: u32::MAX,
        }
    }

    /// Attach the destination operand.
    pub fn with_dst(mut self, dst: Operand) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Append a source operand.
    pub fn with_src(mut self, src: Operand) -> Self {
        self.srcs.push(src);
        self
    }

    /// Attach a predicate read.
    pub fn with_pred(mut self, pred: Operand) -> Self {
        self.pred = Some(pred);
        self
    }

    /// Attach a condition-modifier write.
    pub fn with_cond_mod(mut self, cm: Operand) -> Self {
        self.cond_mod = Some(cm);
        self
    }

    /// Attach an implicit accumulator read.
    pub fn with_acc_src(mut self, acc: Operand) -> Self {
        self.acc_src = Some(acc);
        self
    }

    /// Attach an implicit accumulator write.
    pub fn with_acc_dst(mut self, acc: Operand) -> Self {
        self.acc_dst = Some(acc);
        self
    }

    /// Attach a send descriptor.
    pub fn with_send(mut self, desc: SendDesc) -> Self {
        self.send = Some(desc);
        self
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[inline]
    pub fn exec_size(&self) -> u8 {
        self.exec_size
    }

    #[inline]
    pub fn dst(&self) -> Option<&Operand> {
        self.dst.as_ref()
    }

    #[inline]
    pub fn srcs(&self) -> &[Operand] {
        &self.srcs
    }

    #[inline]
    pub fn send_desc(&self) -> Option<&SendDesc> {
        self.send.as_ref()
    }

    /// Block-local sequence number, assigned by the scheduler before
    /// graph construction. Used for deterministic tie-breaking.
    #[inline]
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Assign the block-local sequence number.
    #[inline]
    pub fn set_local_id(&mut self, id: u32) {
        self.local_id = id;
    }

    /// Whether this instruction must issue atomically with its
    /// successor (set on the lead of a fused pair).
    #[inline]
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Mark the instruction for atomic issue.
    #[inline]
    pub fn set_atomic(&mut self) {
        self.atomic = true;
    }

    #[inline]
    pub fn is_send(&self) -> bool {
        self.opcode == Opcode::Send
    }

    #[inline]
    pub fn is_math(&self) -> bool {
        matches!(self.opcode, Opcode::Math(_))
    }

    #[inline]
    pub fn is_dpas(&self) -> bool {
        self.opcode == Opcode::Dpas
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        self.opcode == Opcode::Label
    }

    #[inline]
    pub fn is_fence(&self) -> bool {
        self.send.map_or(false, |d| d.fence)
    }

    /// Whether any operand is indirectly addressed.
    pub fn has_indirect(&self) -> bool {
        let indirect = |o: &Option<Operand>| o.map_or(false, |op| op.indirect);
        indirect(&self.dst) || self.srcs.iter().any(|s| s.indirect)
    }

    /// Scheduling-barrier classification of this instruction, before
    /// alias information is consulted.
    pub fn barrier_kind(&self) -> BarrierKind {
        if self.is_label() {
            BarrierKind::Label
        } else if self.opcode.is_control_flow() {
            BarrierKind::Control
        } else if self.is_fence() {
            BarrierKind::Fence
        } else {
            BarrierKind::None
        }
    }

    /// Issue pipe occupied by this instruction.
    pub fn pipe(&self) -> Pipe {
        match self.opcode {
            Opcode::Math(_) => Pipe::Math,
            Opcode::Send => Pipe::Send,
            Opcode::Label | Opcode::Branch | Opcode::Join | Opcode::Nop => Pipe::Ctrl,
            _ => Pipe::Alu,
        }
    }

    /// Visit every present operand together with its role.
    pub fn for_each_operand<F: FnMut(OperandRole, &Operand)>(&self, mut f: F) {
        if let Some(d) = &self.dst {
            f(OperandRole::Dst, d);
        }
        for (i, s) in self.srcs.iter().enumerate() {
            f(OperandRole::Src(i as u8), s);
        }
        if let Some(p) = &self.pred {
            f(OperandRole::Pred, p);
        }
        if let Some(c) = &self.cond_mod {
            f(OperandRole::CondMod, c);
        }
        if let Some(a) = &self.acc_src {
            f(OperandRole::AccSrc, a);
        }
        if let Some(a) = &self.acc_dst {
            f(OperandRole::AccDst, a);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
