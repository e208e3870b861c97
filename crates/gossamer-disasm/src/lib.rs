//! PowerPC disassembler.
//!
//! A pure function from (address, 32-bit opcode) to text. The top level
//! dispatches on the 6-bit primary opcode; groups 19, 31, 59 and 63 have
//! sub-dispatchers keyed on the extended opcode. With `simplified` set the
//! common assembler idioms are recognized (`li`, `lis`, `mr`, `nop`, `blr`,
//! `bctr`, branch conditions with prediction hints, SPR mnemonics);
//! otherwise the architected form is printed. Unknown encodings come out as
//! `dc.l` data words, never a panic; the debugger points this at arbitrary
//! memory.

struct Ctx {
    addr: u32,
    op: u32,
    simplified: bool,
}

/// Disassemble a single instruction.
pub fn disasm(addr: u32, opcode: u32, simplified: bool) -> String {
    let ctx = Ctx { addr, op: opcode, simplified };
    match opcode >> 26 {
        3 => fmt3(&ctx, "twi", &format!("{}, r{}, {}", rd(&ctx), ra(&ctx), imm(simm(&ctx)))),
        7 => arith_imm(&ctx, "mulli"),
        8 => arith_imm(&ctx, "subfic"),
        9 => arith_imm(&ctx, "dozi"),
        10 => cmp_imm(&ctx, true),
        11 => cmp_imm(&ctx, false),
        12 => arith_imm(&ctx, "addic"),
        13 => arith_imm(&ctx, "addic."),
        14 => addi_form(&ctx, false),
        15 => addi_form(&ctx, true),
        16 => bcx(&ctx),
        17 => format!("{:<8}", "sc").trim_end().to_string(),
        18 => bx(&ctx),
        19 => group19(&ctx),
        20 => rotate_imm(&ctx, "rlwimi"),
        21 => rotate_imm(&ctx, "rlwinm"),
        22 => rotate_reg(&ctx, "rlmi"),
        23 => rotate_reg(&ctx, "rlwnm"),
        24 => ori_form(&ctx),
        25 => logic_imm(&ctx, "oris"),
        26 => logic_imm(&ctx, "xori"),
        27 => logic_imm(&ctx, "xoris"),
        28 => logic_imm(&ctx, "andi."),
        29 => logic_imm(&ctx, "andis."),
        31 => group31(&ctx),
        32..=47 => int_ldst(&ctx),
        48..=55 => flt_ldst(&ctx),
        59 => group59(&ctx),
        63 => group63(&ctx),
        _ => illegal(&ctx),
    }
}

// ---------------------------------------------------------------- fields

fn rd(ctx: &Ctx) -> u32 {
    (ctx.op >> 21) & 0x1F
}
fn ra(ctx: &Ctx) -> u32 {
    (ctx.op >> 16) & 0x1F
}
fn rb(ctx: &Ctx) -> u32 {
    (ctx.op >> 11) & 0x1F
}
fn rc_set(ctx: &Ctx) -> bool {
    ctx.op & 1 != 0
}
fn simm(ctx: &Ctx) -> i32 {
    ctx.op as u16 as i16 as i32
}
fn uimm(ctx: &Ctx) -> u32 {
    ctx.op as u16 as u32
}
fn ext_opc(ctx: &Ctx) -> u32 {
    (ctx.op >> 1) & 0x3FF
}
fn spr_num(ctx: &Ctx) -> u32 {
    ((ctx.op >> 6) & 0x3E0) | ((ctx.op >> 16) & 0x1F)
}

fn imm(v: i32) -> String {
    if v < 0 {
        format!("-0x{:X}", -(v as i64))
    } else {
        format!("0x{v:X}")
    }
}

fn fmt3(_ctx: &Ctx, mnem: &str, operands: &str) -> String {
    if operands.is_empty() {
        mnem.to_string()
    } else {
        format!("{mnem:<8}{operands}")
    }
}

fn illegal(ctx: &Ctx) -> String {
    format!("{:<8}0x{:08X}", "dc.l", ctx.op)
}

// -------------------------------------------------------- immediate forms

fn arith_imm(ctx: &Ctx, mnem: &str) -> String {
    fmt3(ctx, mnem, &format!("r{}, r{}, {}", rd(ctx), ra(ctx), imm(simm(ctx))))
}

fn addi_form(ctx: &Ctx, shifted: bool) -> String {
    let (m, li) = if shifted { ("addis", "lis") } else { ("addi", "li") };
    if ctx.simplified && ra(ctx) == 0 {
        let v = if shifted { uimm(ctx) as i32 } else { simm(ctx) };
        return fmt3(ctx, li, &format!("r{}, {}", rd(ctx), imm(v)));
    }
    let v = if shifted { uimm(ctx) as i32 } else { simm(ctx) };
    fmt3(ctx, m, &format!("r{}, r{}, {}", rd(ctx), ra(ctx), imm(v)))
}

fn logic_imm(ctx: &Ctx, mnem: &str) -> String {
    // Source and destination swap relative to the arithmetic forms.
    fmt3(ctx, mnem, &format!("r{}, r{}, 0x{:04X}", ra(ctx), rd(ctx), uimm(ctx)))
}

fn ori_form(ctx: &Ctx) -> String {
    if ctx.simplified && ctx.op == 0x6000_0000 {
        return "nop".to_string();
    }
    if ctx.simplified && uimm(ctx) == 0 {
        return fmt3(ctx, "mr", &format!("r{}, r{}", ra(ctx), rd(ctx)));
    }
    logic_imm(ctx, "ori")
}

fn cmp_imm(ctx: &Ctx, logical: bool) -> String {
    if ctx.op & 0x0020_0000 != 0 {
        return illegal(ctx); // L=1 is 64-bit only
    }
    let crf = (ctx.op >> 23) & 7;
    if ctx.simplified {
        let m = if logical { "cmplwi" } else { "cmpwi" };
        let v = if logical { uimm(ctx) as i32 } else { simm(ctx) };
        return fmt3(ctx, m, &format!("cr{}, r{}, {}", crf, ra(ctx), imm(v)));
    }
    let m = if logical { "cmpli" } else { "cmpi" };
    let v = if logical { uimm(ctx) as i32 } else { simm(ctx) };
    fmt3(ctx, m, &format!("crf{}, r{}, {}", crf, ra(ctx), imm(v)))
}

fn rotate_imm(ctx: &Ctx, mnem: &str) -> String {
    let m = if rc_set(ctx) { format!("{mnem}.") } else { mnem.to_string() };
    fmt3(
        ctx,
        &m,
        &format!(
            "r{}, r{}, sh{}, mb{}, me{}",
            ra(ctx),
            rd(ctx),
            rb(ctx),
            (ctx.op >> 6) & 0x1F,
            (ctx.op >> 1) & 0x1F
        ),
    )
}

fn rotate_reg(ctx: &Ctx, mnem: &str) -> String {
    let m = if rc_set(ctx) { format!("{mnem}.") } else { mnem.to_string() };
    fmt3(
        ctx,
        &m,
        &format!(
            "r{}, r{}, r{}, mb{}, me{}",
            ra(ctx),
            rd(ctx),
            rb(ctx),
            (ctx.op >> 6) & 0x1F,
            (ctx.op >> 1) & 0x1F
        ),
    )
}

// --------------------------------------------------------------- branches

const BR_COND: [&str; 8] = ["ge", "le", "ne", "ns", "lt", "gt", "eq", "so"];

fn branch_suffixes(ctx: &Ctx, bo: u32, backward: bool) -> String {
    let mut s = String::new();
    if ctx.op & 1 != 0 {
        s.push('l');
    }
    if ctx.op & 2 != 0 {
        s.push('a');
    }
    if bo & 1 != 0 {
        s.push(if backward { '-' } else { '+' });
    } else if bo & 4 != 0 && backward {
        // Plain conditional backward branch: static not-taken hint display.
        s.push('-');
    }
    s
}

fn bx(ctx: &Ctx) -> String {
    let li = ((ctx.op & 0x03FF_FFFC) << 6) as i32 >> 6;
    let dst = if ctx.op & 2 != 0 { li as u32 } else { ctx.addr.wrapping_add(li as u32) };
    let mnem = match ctx.op & 3 {
        0 => "b",
        1 => "bl",
        2 => "ba",
        _ => "bla",
    };
    fmt3(ctx, mnem, &format!("0x{dst:08X}"))
}

/// Conditional branch body shared by bc, bclr and bcctr. `tail` is "" / "lr"
/// / "ctr"; `dst` is the printed target for the relative form.
fn bc_body(ctx: &Ctx, tail: &str, dst: Option<u32>) -> String {
    let bo = rd(ctx);
    let bi = ra(ctx);
    let cr = bi >> 2;
    let backward = ctx.op & 0x8000 != 0 && dst.is_some();

    let generic = || {
        let mnem = format!("bc{}{}", tail, if rc_set(ctx) { "l" } else { "" });
        match dst {
            Some(d) => fmt3(ctx, &mnem, &format!("{bo}, {bi}, 0x{d:08X}")),
            None => fmt3(ctx, &mnem, &format!("{bo}, {bi}")),
        }
    };

    if !ctx.simplified {
        return generic();
    }

    if bo & 0x14 == 0x14 {
        // Branch always.
        let mnem = format!("b{}{}", tail, if ctx.op & 1 != 0 { "l" } else { "" });
        return match dst {
            Some(d) => fmt3(ctx, &mnem, &format!("0x{d:08X}")),
            None => mnem,
        };
    }

    let mut mnem = String::from("b");
    let mut operands = String::new();

    if bo & 4 == 0 {
        // CTR-decrementing forms.
        if tail == "ctr" {
            return generic(); // decrement-and-branch-to-CTR is invalid
        }
        mnem.push('d');
        mnem.push_str(if bo & 2 != 0 { "z" } else { "nz" });
        if bo & 0x10 == 0 {
            mnem.push(if bo & 8 != 0 { 't' } else { 'f' });
            if cr != 0 {
                operands.push_str(&format!("4*cr{cr}+"));
            }
            operands.push_str(BR_COND[4 + (bi & 3) as usize]);
            operands.push_str(", ");
        }
        mnem.push_str(tail);
    } else if bo & 0x10 == 0 {
        // Plain condition test.
        mnem.push_str(BR_COND[(((bo >> 1) & 4) | (bi & 3)) as usize]);
        mnem.push_str(tail);
        operands.push_str(&format!("cr{cr}"));
        if dst.is_some() {
            operands.push_str(", ");
        }
    } else {
        return generic();
    }

    mnem.push_str(&branch_suffixes(ctx, bo, backward));
    match dst {
        Some(d) => fmt3(ctx, &mnem, &format!("{operands}0x{d:08X}")),
        None => {
            let operands = operands.trim_end_matches(", ").to_string();
            if operands.is_empty() {
                mnem
            } else {
                fmt3(ctx, &mnem, &operands)
            }
        }
    }
}

fn bcx(ctx: &Ctx) -> String {
    let bd = (ctx.op & 0xFFFC) as u16 as i16 as i32;
    let dst = if ctx.op & 2 != 0 { bd as u32 } else { ctx.addr.wrapping_add(bd as u32) };
    bc_body(ctx, "", Some(dst))
}

// ---------------------------------------------------------------- group 19

fn crb_op(ctx: &Ctx, mnem: &str) -> String {
    fmt3(ctx, mnem, &format!("crb{}, crb{}, crb{}", rd(ctx), ra(ctx), rb(ctx)))
}

fn group19(ctx: &Ctx) -> String {
    match ext_opc(ctx) {
        0 => fmt3(ctx, "mcrf", &format!("crf{}, crf{}", rd(ctx) >> 2, ra(ctx) >> 2)),
        16 => bc_body(ctx, "lr", None),
        33 => crb_op(ctx, "crnor"),
        50 => "rfi".to_string(),
        129 => crb_op(ctx, "crandc"),
        150 => "isync".to_string(),
        193 => crb_op(ctx, "crxor"),
        225 => crb_op(ctx, "crnand"),
        257 => crb_op(ctx, "crand"),
        289 => crb_op(ctx, "creqv"),
        417 => crb_op(ctx, "crorc"),
        449 => crb_op(ctx, "cror"),
        528 => bc_body(ctx, "ctr", None),
        _ => illegal(ctx),
    }
}

// ---------------------------------------------------------------- group 31

const OPC_SUBS: [&str; 16] =
    ["subfc", "subf", "", "neg", "subfe", "", "subfze", "subfme", "doz", "", "", "abs", "", "", "", "nabs"];
const OPC_ADDS: [&str; 9] = ["addc", "", "", "", "adde", "", "addze", "addme", "add"];
const OPC_MULDIV: [&str; 16] =
    ["mulhwu", "", "mulhw", "mul", "", "", "", "mullw", "", "", "div", "divs", "", "", "divwu", "divw"];
const OPC_LOGIC: [&str; 16] =
    ["and", "andc", "", "nor", "", "", "", "", "eqv", "xor", "", "", "orc", "or", "nand", ""];
const OPC_IDX_LDST: [&str; 24] = [
    "lwzx", "lwzux", "lbzx", "lbzux", "stwx", "stwux", "stbx", "stbux", "lhzx", "lhzux", "lhax",
    "lhaux", "sthx", "sthux", "", "", "lfsx", "lfsux", "lfdx", "lfdux", "stfsx", "stfsux", "stfdx",
    "stfdux",
];

/// Two-operand members of the subtract/add families (rB must be zero).
fn two_operand(index: usize) -> bool {
    matches!(index, 3 | 6 | 7 | 11 | 15)
}

fn oe_dot(mnem: &str, oe: bool, rc: bool) -> String {
    let mut s = mnem.to_string();
    if oe {
        s.push('o');
    }
    if rc {
        s.push('.');
    }
    s
}

fn group31(ctx: &Ctx) -> String {
    let ext = ext_opc(ctx);
    let index = (ext >> 5) as usize;
    let rc = rc_set(ctx);
    let oe = ext & 0x200 != 0;

    match ext & 0x1F {
        8 => {
            let m = OPC_SUBS[index & 0xF];
            if m.is_empty() {
                return illegal(ctx);
            }
            let mnem = oe_dot(m, oe, rc);
            return if two_operand(index & 0xF) {
                if rb(ctx) != 0 {
                    illegal(ctx)
                } else {
                    fmt3(ctx, &mnem, &format!("r{}, r{}", rd(ctx), ra(ctx)))
                }
            } else {
                fmt3(ctx, &mnem, &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)))
            };
        }
        10 => {
            let i = index & 0xF;
            if i > 8 || OPC_ADDS[i].is_empty() {
                return illegal(ctx);
            }
            let mnem = oe_dot(OPC_ADDS[i], oe, rc);
            return if two_operand(i) {
                if rb(ctx) != 0 {
                    illegal(ctx)
                } else {
                    fmt3(ctx, &mnem, &format!("r{}, r{}", rd(ctx), ra(ctx)))
                }
            } else {
                fmt3(ctx, &mnem, &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)))
            };
        }
        11 => {
            let i = index & 0xF;
            if OPC_MULDIV[i].is_empty() || ((i == 0 || i == 2) && oe) {
                return illegal(ctx);
            }
            let mnem = oe_dot(OPC_MULDIV[i], oe, rc);
            return fmt3(ctx, &mnem, &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)));
        }
        0x1C => {
            if index == 13 && rd(ctx) == rb(ctx) && ctx.simplified {
                let mnem = if rc { "mr." } else { "mr" };
                return fmt3(ctx, mnem, &format!("r{}, r{}", ra(ctx), rd(ctx)));
            }
            let m = OPC_LOGIC[index & 0xF];
            if m.is_empty() {
                return illegal(ctx);
            }
            let mnem = if rc { format!("{m}.") } else { m.to_string() };
            return fmt3(ctx, &mnem, &format!("r{}, r{}, r{}", ra(ctx), rd(ctx), rb(ctx)));
        }
        0x17 => {
            // Extended opcodes above the table (e.g. stfiwx) fall through to
            // the explicit matches below.
            if index <= 23 && !rc && !OPC_IDX_LDST[index].is_empty() {
                let m = OPC_IDX_LDST[index];
                return if index < 16 {
                    fmt3(ctx, m, &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)))
                } else {
                    fmt3(ctx, m, &format!("fr{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)))
                };
            }
        }
        _ => {}
    }

    let rs_ra_rb = format!("r{}, r{}, r{}", ra(ctx), rd(ctx), rb(ctx));
    let cache_ab = format!("r{}, r{}", ra(ctx), rb(ctx));

    match ext {
        0 => {
            if ctx.op & 0x0020_0000 != 0 {
                illegal(ctx)
            } else if ctx.simplified {
                fmt3(ctx, "cmpw", &format!("cr{}, r{}, r{}", rd(ctx) >> 2, ra(ctx), rb(ctx)))
            } else {
                fmt3(ctx, "cmp", &format!("crf{}, r{}, r{}", rd(ctx) >> 2, ra(ctx), rb(ctx)))
            }
        }
        32 => {
            if ctx.op & 0x0020_0000 != 0 {
                illegal(ctx)
            } else if ctx.simplified {
                fmt3(ctx, "cmplw", &format!("cr{}, r{}, r{}", rd(ctx) >> 2, ra(ctx), rb(ctx)))
            } else {
                fmt3(ctx, "cmpl", &format!("crf{}, r{}, r{}", rd(ctx) >> 2, ra(ctx), rb(ctx)))
            }
        }
        4 => fmt3(ctx, "tw", &format!("{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        19 => fmt3(ctx, "mfcr", &format!("r{}", rd(ctx))),
        20 => fmt3(ctx, "lwarx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        24 | 536 | 792 => {
            let base = match ext {
                24 => "slw",
                536 => "srw",
                _ => "sraw",
            };
            let mnem = if rc { format!("{base}.") } else { base.to_string() };
            fmt3(ctx, &mnem, &rs_ra_rb)
        }
        824 => {
            let mnem = if rc { "srawi." } else { "srawi" };
            fmt3(ctx, mnem, &format!("r{}, r{}, sh{}", ra(ctx), rd(ctx), rb(ctx)))
        }
        26 | 922 | 954 => {
            let base = match ext {
                26 => "cntlzw",
                922 => "extsh",
                _ => "extsb",
            };
            let mnem = if rc { format!("{base}.") } else { base.to_string() };
            fmt3(ctx, &mnem, &format!("r{}, r{}", ra(ctx), rd(ctx)))
        }
        83 => fmt3(ctx, "mfmsr", &format!("r{}", rd(ctx))),
        144 => {
            if ctx.op & 0x0010_0801 != 0 {
                illegal(ctx)
            } else if ctx.simplified && (ctx.op >> 12) & 0xFF == 0xFF {
                fmt3(ctx, "mtcr", &format!("r{}", rd(ctx)))
            } else {
                fmt3(ctx, "mtcrf", &format!("0x{:02X}, r{}", (ctx.op >> 12) & 0xFF, rd(ctx)))
            }
        }
        146 => fmt3(ctx, "mtmsr", &format!("r{}", rd(ctx))),
        150 => {
            if rc {
                fmt3(ctx, "stwcx.", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx)))
            } else {
                illegal(ctx)
            }
        }
        210 => fmt3(ctx, "mtsr", &format!("sr{}, r{}", ra(ctx) & 0xF, rd(ctx))),
        242 => fmt3(ctx, "mtsrin", &format!("r{}, r{}", rd(ctx), rb(ctx))),
        310 => fmt3(ctx, "eciwx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        339 | 371 => {
            let spr = spr_num(ctx);
            if ext == 371 {
                let m = if spr == 269 { "mftbu" } else { "mftb" };
                return fmt3(ctx, m, &format!("r{}", rd(ctx)));
            }
            if ctx.simplified {
                let m = match spr {
                    1 => Some("mfxer"),
                    8 => Some("mflr"),
                    9 => Some("mfctr"),
                    _ => None,
                };
                if let Some(m) = m {
                    return fmt3(ctx, m, &format!("r{}", rd(ctx)));
                }
            }
            fmt3(ctx, "mfspr", &format!("r{}, spr{}", rd(ctx), spr))
        }
        438 => fmt3(ctx, "ecowx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        467 => {
            let spr = spr_num(ctx);
            if ctx.simplified {
                let m = match spr {
                    1 => Some("mtxer"),
                    8 => Some("mtlr"),
                    9 => Some("mtctr"),
                    _ => None,
                };
                if let Some(m) = m {
                    return fmt3(ctx, m, &format!("r{}", rd(ctx)));
                }
            }
            fmt3(ctx, "mtspr", &format!("spr{}, r{}", spr, rd(ctx)))
        }
        512 => fmt3(ctx, "mcrxr", &format!("crf{}", rd(ctx) >> 2)),
        533 => fmt3(ctx, "lswx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        534 => fmt3(ctx, "lwbrx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        595 => fmt3(ctx, "mfsr", &format!("r{}, sr{}", rd(ctx), ra(ctx) & 0xF)),
        597 => fmt3(ctx, "lswi", &format!("r{}, r{}, {}", rd(ctx), ra(ctx), rb(ctx))),
        598 => "sync".to_string(),
        659 => fmt3(ctx, "mfsrin", &format!("r{}, r{}", rd(ctx), rb(ctx))),
        661 => fmt3(ctx, "stswx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        662 => fmt3(ctx, "stwbrx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        725 => fmt3(ctx, "stswi", &format!("r{}, r{}, {}", rd(ctx), ra(ctx), rb(ctx))),
        790 => fmt3(ctx, "lhbrx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        918 => fmt3(ctx, "sthbrx", &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        983 => fmt3(ctx, "stfiwx", &format!("fr{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        54 => fmt3(ctx, "dcbst", &cache_ab),
        86 => fmt3(ctx, "dcbf", &cache_ab),
        246 => fmt3(ctx, "dcbtst", &cache_ab),
        278 => fmt3(ctx, "dcbt", &cache_ab),
        470 => fmt3(ctx, "dcbi", &cache_ab),
        982 => fmt3(ctx, "icbi", &cache_ab),
        1014 => fmt3(ctx, "dcbz", &cache_ab),
        306 => fmt3(ctx, "tlbie", &format!("r{}", rb(ctx))),
        370 => "tlbia".to_string(),
        566 => "tlbsync".to_string(),
        854 => "eieio".to_string(),
        978 => fmt3(ctx, "tlbld", &format!("r{}", rb(ctx))),
        1010 => fmt3(ctx, "tlbli", &format!("r{}", rb(ctx))),
        // POWER (601) leftovers that do not fold into the families above.
        29 => fmt3(ctx, &oe_dot("maskg", false, rc), &rs_ra_rb),
        277 => fmt3(ctx, &oe_dot("lscbx", false, rc), &format!("r{}, r{}, r{}", rd(ctx), ra(ctx), rb(ctx))),
        531 => fmt3(ctx, "clcs", &format!("r{}, r{}", rd(ctx), ra(ctx))),
        537 => fmt3(ctx, &oe_dot("rrib", false, rc), &rs_ra_rb),
        541 => fmt3(ctx, &oe_dot("maskir", false, rc), &rs_ra_rb),
        152 | 153 | 184 | 216 | 217 | 248 | 664 | 665 | 696 | 728 | 729 | 760 | 920 | 921 | 952 => {
            let base = match ext {
                152 => "slq",
                153 => "sle",
                184 => "sliq",
                216 => "sllq",
                217 => "sleq",
                248 => "slliq",
                664 => "srq",
                665 => "sre",
                696 => "sriq",
                728 => "srlq",
                729 => "sreq",
                760 => "srliq",
                920 => "sraq",
                921 => "srea",
                _ => "sraiq",
            };
            fmt3(ctx, &oe_dot(base, false, rc), &rs_ra_rb)
        }
        _ => illegal(ctx),
    }
}

// ------------------------------------------------------------- load/store

const OPC_INT_LDST: [&str; 16] = [
    "lwz", "lwzu", "lbz", "lbzu", "stw", "stwu", "stb", "stbu", "lhz", "lhzu", "lha", "lhau",
    "sth", "sthu", "lmw", "stmw",
];
const OPC_FLT_LDST: [&str; 8] = ["lfs", "lfsu", "lfd", "lfdu", "stfs", "stfsu", "stfd", "stfdu"];

fn int_ldst(ctx: &Ctx) -> String {
    let opc = ((ctx.op >> 26) - 32) as usize;
    let (r_d, r_a) = (rd(ctx), ra(ctx));
    // ra=0 is invalid for update forms; ra=rd for loads with update.
    if (opc < 14 && opc & 5 == 1 && r_a == r_d) || (opc & 1 == 1 && r_a == 0) {
        return illegal(ctx);
    }
    let v = imm(simm(ctx));
    if r_a != 0 {
        fmt3(ctx, OPC_INT_LDST[opc], &format!("r{r_d}, {v}(r{r_a})"))
    } else {
        fmt3(ctx, OPC_INT_LDST[opc], &format!("r{r_d}, {v}"))
    }
}

fn flt_ldst(ctx: &Ctx) -> String {
    let opc = ((ctx.op >> 26) - 48) as usize;
    let (r_d, r_a) = (rd(ctx), ra(ctx));
    if ((opc == 1 || opc == 3) && r_a == r_d) || (opc & 1 == 1 && r_a == 0) {
        return illegal(ctx);
    }
    let v = imm(simm(ctx));
    if r_a != 0 {
        fmt3(ctx, OPC_FLT_LDST[opc], &format!("fr{r_d}, {v}(r{r_a})"))
    } else {
        fmt3(ctx, OPC_FLT_LDST[opc], &format!("fr{r_d}, {v}"))
    }
}

// ------------------------------------------------------------ FP groups

fn fp_dot(mnem: &str, rc: bool) -> String {
    if rc {
        format!("{mnem}.")
    } else {
        mnem.to_string()
    }
}

fn fp_ab(ctx: &Ctx, mnem: &str) -> String {
    fmt3(ctx, &fp_dot(mnem, rc_set(ctx)), &format!("fr{}, fr{}, fr{}", rd(ctx), ra(ctx), rb(ctx)))
}

fn fp_ac(ctx: &Ctx, mnem: &str) -> String {
    let frc = (ctx.op >> 6) & 0x1F;
    fmt3(ctx, &fp_dot(mnem, rc_set(ctx)), &format!("fr{}, fr{}, fr{}", rd(ctx), ra(ctx), frc))
}

fn fp_abc(ctx: &Ctx, mnem: &str) -> String {
    let frc = (ctx.op >> 6) & 0x1F;
    fmt3(
        ctx,
        &fp_dot(mnem, rc_set(ctx)),
        &format!("fr{}, fr{}, fr{}, fr{}", rd(ctx), ra(ctx), frc, rb(ctx)),
    )
}

fn fp_b(ctx: &Ctx, mnem: &str) -> String {
    fmt3(ctx, &fp_dot(mnem, rc_set(ctx)), &format!("fr{}, fr{}", rd(ctx), rb(ctx)))
}

fn group59(ctx: &Ctx) -> String {
    match ext_opc(ctx) & 0x1F {
        18 => fp_ab(ctx, "fdivs"),
        20 => fp_ab(ctx, "fsubs"),
        21 => fp_ab(ctx, "fadds"),
        22 => fp_b(ctx, "fsqrts"),
        24 => fp_b(ctx, "fres"),
        25 => fp_ac(ctx, "fmuls"),
        28 => fp_abc(ctx, "fmsubs"),
        29 => fp_abc(ctx, "fmadds"),
        30 => fp_abc(ctx, "fnmsubs"),
        31 => fp_abc(ctx, "fnmadds"),
        _ => illegal(ctx),
    }
}

fn group63(ctx: &Ctx) -> String {
    // 5-bit A-form opcodes first.
    match ext_opc(ctx) & 0x1F {
        23 => return fp_abc(ctx, "fsel"),
        25 => return fp_ac(ctx, "fmul"),
        28 => return fp_abc(ctx, "fmsub"),
        29 => return fp_abc(ctx, "fmadd"),
        30 => return fp_abc(ctx, "fnmsub"),
        31 => return fp_abc(ctx, "fnmadd"),
        _ => {}
    }
    match ext_opc(ctx) {
        0 => fmt3(ctx, "fcmpu", &format!("crf{}, fr{}, fr{}", rd(ctx) >> 2, ra(ctx), rb(ctx))),
        12 => fp_b(ctx, "frsp"),
        14 => fp_b(ctx, "fctiw"),
        15 => fp_b(ctx, "fctiwz"),
        18 => fp_ab(ctx, "fdiv"),
        20 => fp_ab(ctx, "fsub"),
        21 => fp_ab(ctx, "fadd"),
        22 => fp_b(ctx, "fsqrt"),
        26 => fp_b(ctx, "frsqrte"),
        32 => fmt3(ctx, "fcmpo", &format!("crf{}, fr{}, fr{}", rd(ctx) >> 2, ra(ctx), rb(ctx))),
        38 => fmt3(ctx, &fp_dot("mtfsb1", rc_set(ctx)), &format!("crb{}", rd(ctx))),
        40 => fp_b(ctx, "fneg"),
        64 => fmt3(ctx, "mcrfs", &format!("crf{}, crf{}", rd(ctx) >> 2, ra(ctx) >> 2)),
        70 => fmt3(ctx, &fp_dot("mtfsb0", rc_set(ctx)), &format!("crb{}", rd(ctx))),
        72 => fp_b(ctx, "fmr"),
        134 => fmt3(
            ctx,
            &fp_dot("mtfsfi", rc_set(ctx)),
            &format!("crf{}, {}", rd(ctx) >> 2, (ctx.op >> 12) & 0xF),
        ),
        136 => fp_b(ctx, "fnabs"),
        264 => fp_b(ctx, "fabs"),
        583 => fmt3(ctx, &fp_dot("mffs", rc_set(ctx)), &format!("fr{}", rd(ctx))),
        711 => fmt3(
            ctx,
            &fp_dot("mtfsf", rc_set(ctx)),
            &format!("0x{:02X}, fr{}", (ctx.op >> 17) & 0xFF, rb(ctx)),
        ),
        _ => illegal(ctx),
    }
}
