//! Command dispatch loop.
//!
//! [`execute`] applies one request to a process image and builds the reply;
//! it never touches the segment and never panics on malformed input.
//! [`CommandDispatcher`] drives it against a region, one request per tick.
//!
//! ## Validation Order
//!
//! 1. Unknown or non-request opcode → `InvalidCommand`
//! 2. Length outside the opcode's contract → `DataLengthInvalid`
//! 3. Length not below the record capacity → `DataLengthOutOfRange`
//! 4. Area code not INPUT/OUTPUT/MEMORY → `InvalidDriverArea`
//! 5. Process memory rejects the address → `ProcessData` + sub-code

use crate::command::{ADDRESS_LEN, CommandRecord, NokCode, Opcode, decode_address};
use crate::error::ShmResult;
use crate::region::SharedMemoryRegion;
use heapless::Vec as FixedVec;
use plcio_common::consts::{COMMAND_CAPACITY, MAX_BATCH_BITS};
use plcio_common::process::{ProcessAddress, ProcessArea, ProcessData, ProcessError, ProcessValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of executing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    /// Reply to submit
    pub reply: CommandRecord,
    /// True if the request was `EXIT`
    pub exit: bool,
}

impl Execution {
    fn reply(reply: CommandRecord) -> Self {
        Self { reply, exit: false }
    }

    fn nok(code: NokCode) -> Self {
        Self::reply(CommandRecord::nok(code, 0, 0))
    }
}

enum LengthRule {
    Exact(usize),
    Triples,
}

impl LengthRule {
    fn accepts(&self, length: usize) -> bool {
        match self {
            LengthRule::Exact(n) => length == *n,
            LengthRule::Triples => length > 0 && length % ADDRESS_LEN == 0,
        }
    }
}

fn process_nok(err: ProcessError, index: usize) -> Execution {
    Execution::reply(CommandRecord::nok(
        NokCode::ProcessData,
        err.code(),
        u8::try_from(index).unwrap_or(u8::MAX),
    ))
}

fn write_value<T: ProcessValue>(cmd: &CommandRecord, data: &mut ProcessData) -> Result<(), ProcessError> {
    let addr = ProcessAddress::from_raw(cmd.values[0], usize::from(cmd.values[1]), 0);
    let value = T::decode(&cmd.values[2..2 + T::WIDTH]);
    data.set(addr, value)
}

/// Apply one request to `data` and build its reply.
pub fn execute(cmd: &CommandRecord, data: &mut ProcessData) -> Execution {
    let Some(opcode) = cmd.decoded_opcode() else {
        return Execution::nok(NokCode::InvalidCommand);
    };

    let rule = match opcode {
        Opcode::Exit | Opcode::Ping => LengthRule::Exact(0),
        Opcode::SetBit
        | Opcode::ResetBit
        | Opcode::InvertBit
        | Opcode::WriteByte
        | Opcode::WriteWord
        | Opcode::WriteDword
        | Opcode::WriteInt
        | Opcode::WriteReal => LengthRule::Exact(ADDRESS_LEN),
        Opcode::SetBits => LengthRule::Triples,
        Opcode::None | Opcode::Pong | Opcode::Ok | Opcode::Nok => {
            return Execution::nok(NokCode::InvalidCommand);
        }
    };

    let length = cmd.len();
    if !rule.accepts(length) {
        return Execution::nok(NokCode::DataLengthInvalid);
    }
    if length >= COMMAND_CAPACITY {
        return Execution::nok(NokCode::DataLengthOutOfRange);
    }

    match opcode {
        Opcode::Exit => {
            return Execution {
                reply: CommandRecord::exit(),
                exit: true,
            };
        }
        Opcode::Ping => return Execution::reply(CommandRecord::pong()),
        _ => {}
    }

    let payload = &cmd.values[..length];
    let mut addrs: FixedVec<ProcessAddress, MAX_BATCH_BITS> = FixedVec::new();
    for triple in payload.chunks_exact(ADDRESS_LEN) {
        if ProcessArea::from_code(triple[0]).is_none() {
            return Execution::nok(NokCode::InvalidDriverArea);
        }
        if addrs.push(decode_address(triple)).is_err() {
            return Execution::nok(NokCode::DataLengthOutOfRange);
        }
    }

    let single = addrs.first().copied().unwrap_or(ProcessAddress::from_raw(0, 0, 0));
    let applied = match opcode {
        Opcode::SetBit => data.set_bit(single),
        Opcode::ResetBit => data.reset_bit(single),
        Opcode::InvertBit => data.invert_bit(single),
        Opcode::WriteByte => write_value::<u8>(cmd, data),
        Opcode::WriteWord => write_value::<u16>(cmd, data),
        Opcode::WriteDword => write_value::<u32>(cmd, data),
        Opcode::WriteInt => write_value::<i32>(cmd, data),
        Opcode::WriteReal => write_value::<f32>(cmd, data),
        Opcode::SetBits => {
            return match data.set_bits(&addrs) {
                Ok(()) => Execution::reply(CommandRecord::ok()),
                Err(batch) => process_nok(batch.source, batch.index),
            };
        }
        _ => Ok(()),
    };

    match applied {
        Ok(()) => Execution::reply(CommandRecord::ok()),
        Err(err) => process_nok(err, 0),
    }
}

/// What one dispatch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No request was pending
    Idle,
    /// A request was answered
    Served {
        /// Raw request opcode
        opcode: u32,
        /// True if the reply was NOK
        rejected: bool,
    },
    /// `EXIT` was answered; the loop stops
    Exit,
}

/// Dispatch loop counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Cycles run
    pub cycles: u64,
    /// Requests answered
    pub served: u64,
    /// Requests answered with NOK
    pub rejected: u64,
    /// Cycles that exceeded the tick
    pub overruns: u64,
}

/// Serves requests submitted to a region.
pub struct CommandDispatcher {
    region: SharedMemoryRegion,
    stats: DispatchStats,
}

impl CommandDispatcher {
    /// Serve requests on `region`.
    pub fn new(region: SharedMemoryRegion) -> Self {
        Self {
            region,
            stats: DispatchStats::default(),
        }
    }

    /// Served region.
    pub fn region(&self) -> &SharedMemoryRegion {
        &self.region
    }

    /// Give the region back.
    pub fn into_region(self) -> SharedMemoryRegion {
        self.region
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Poll once, execute any pending request and submit its reply.
    pub fn run_cycle(&mut self) -> ShmResult<CycleOutcome> {
        self.stats.cycles += 1;
        let Some(cmd) = self.region.poll_request()? else {
            return Ok(CycleOutcome::Idle);
        };

        let execution = self.region.access_process_data(|data| execute(&cmd, data))?;
        self.region.submit_reply(&execution.reply)?;
        self.stats.served += 1;

        if execution.exit {
            info!("EXIT received on {}", self.region.name());
            return Ok(CycleOutcome::Exit);
        }
        let rejected = execution.reply.decoded_opcode() == Some(Opcode::Nok);
        if rejected {
            self.stats.rejected += 1;
            debug!(
                "Rejected opcode {}: nok={} sub={} index={}",
                cmd.opcode, execution.reply.values[0], execution.reply.values[1], execution.reply.values[2]
            );
        }
        Ok(CycleOutcome::Served {
            opcode: cmd.opcode,
            rejected,
        })
    }

    /// Run cycles every `tick` until `EXIT` or `running` drops.
    ///
    /// A cycle in flight always completes before the flag is checked.
    pub fn run(&mut self, running: &AtomicBool, tick: Duration) -> ShmResult<DispatchStats> {
        info!(
            "Dispatch loop started on {} (tick={}us)",
            self.region.name(),
            tick.as_micros()
        );

        while running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();

            if self.run_cycle()? == CycleOutcome::Exit {
                break;
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < tick {
                std::thread::sleep(tick - elapsed);
            } else {
                self.stats.overruns += 1;
                if self.stats.overruns <= 10 || self.stats.overruns % 1000 == 0 {
                    warn!(
                        "Dispatch overrun #{}: cycle took {}us (tick {}us)",
                        self.stats.overruns,
                        elapsed.as_micros(),
                        tick.as_micros()
                    );
                }
            }

            if self.stats.cycles % 1000 == 0 {
                debug!(
                    "Dispatch loop: {} cycles, served={}, rejected={}, overruns={}",
                    self.stats.cycles, self.stats.served, self.stats.rejected, self.stats.overruns
                );
            }
        }

        info!(
            "Dispatch loop stopped after {} cycles ({} served, {} rejected)",
            self.stats.cycles, self.stats.served, self.stats.rejected
        );
        Ok(self.stats)
    }
}
