mod cleanup;
mod conditions;
mod sequential_halt;
mod soft_fail;
